use crate::config::{Number, EPSILON};
use wide::f32x8;

/// Compute cosine similarity between two vectors using SIMD operations.
/// Returns `None` when the lengths differ. The result is clamped to [-1, 1];
/// if either vector is (near) zero the similarity is 0.
pub fn compute_cosine_similarity_simd(a: &[Number], b: &[Number]) -> Option<Number> {
    if a.len() != b.len() {
        return None;
    }

    let mut dot_product = f32x8::splat(0.0);
    let mut mag_a = f32x8::splat(0.0);
    let mut mag_b = f32x8::splat(0.0);

    let len = a.len();
    let simd_len = len - (len % 8);

    for (ca, cb) in a[..simd_len].chunks_exact(8).zip(b[..simd_len].chunks_exact(8)) {
        let va = f32x8::new(lanes(ca));
        let vb = f32x8::new(lanes(cb));
        dot_product += va * vb;
        mag_a += va * va;
        mag_b += vb * vb;
    }

    let mut scalar_dot_product = dot_product.reduce_add();
    let mut scalar_mag_a = mag_a.reduce_add();
    let mut scalar_mag_b = mag_b.reduce_add();

    // Remainder
    for i in simd_len..len {
        scalar_dot_product += a[i] * b[i];
        scalar_mag_a += a[i] * a[i];
        scalar_mag_b += b[i] * b[i];
    }

    let denominator = (scalar_mag_a * scalar_mag_b).sqrt();
    if denominator < EPSILON {
        Some(0.0)
    } else {
        Some((scalar_dot_product / denominator).clamp(-1.0, 1.0))
    }
}

fn lanes(chunk: &[Number]) -> [Number; 8] {
    let mut out = [0.0; 8];
    out.copy_from_slice(chunk);
    out
}

pub fn normalize_vector(vector: &mut [Number]) {
    let magnitude: Number = vector.iter().map(|&x| x * x).sum::<Number>().sqrt();
    if magnitude > EPSILON {
        for x in vector.iter_mut() {
            *x /= magnitude;
        }
    }
}
