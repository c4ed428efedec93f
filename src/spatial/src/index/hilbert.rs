use crate::geometry::bounding_box::BoundingBox;

/// Largest coordinate on the 16-bit-order Hilbert grid.
pub const HILBERT_MAX: u32 = u16::MAX as u32;

/// Order item indices by the Hilbert index of each box centre.
///
/// Centres are projected onto a `HILBERT_MAX × HILBERT_MAX` grid spanning the
/// union of all boxes. The sort is stable, so items sharing a Hilbert cell
/// keep their input order and the result is deterministic.
pub fn hilbert_sort_order(boxes: &[BoundingBox]) -> Vec<usize> {
    let mut extent = BoundingBox::empty();
    for bbox in boxes {
        extent.update_box(bbox);
    }

    let scale = |width: f64| {
        if width > 0.0 {
            HILBERT_MAX as f64 / width
        } else {
            0.0
        }
    };
    let hilbert_width = scale(extent.x().width());
    let hilbert_height = scale(extent.y().width());

    let values: Vec<u32> = boxes
        .iter()
        .map(|bbox| {
            let (center_x, center_y) = bbox.center();
            let hx = ((center_x - extent.min_x()) * hilbert_width).clamp(0.0, HILBERT_MAX as f64);
            let hy = ((center_y - extent.min_y()) * hilbert_height).clamp(0.0, HILBERT_MAX as f64);
            hilbert_index(hx as u32, hy as u32)
        })
        .collect();

    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by_key(|&i| values[i]);
    order
}

fn interleave(mut x: u32) -> u32 {
    x = (x | (x << 8)) & 0x00FF00FF;
    x = (x | (x << 4)) & 0x0F0F0F0F;
    x = (x | (x << 2)) & 0x33333333;
    x = (x | (x << 1)) & 0x55555555;
    x
}

/// Position of grid cell `(x, y)` along the Hilbert curve of order 16.
///
/// Both coordinates must be at most [`HILBERT_MAX`]. Branch-free prefix scan
/// formulation (<https://github.com/rawrunprotected/hilbert_curves>).
#[allow(non_snake_case)]
pub fn hilbert_index(x: u32, y: u32) -> u32 {
    // Initial prefix scan round, prime with x and y
    let mut a = x ^ y;
    let mut b = 0xFFFF ^ a;
    let mut c = 0xFFFF ^ (x | y);
    let mut d = x & (y ^ 0xFFFF);
    let mut A = a | (b >> 1);
    let mut B = (a >> 1) ^ a;
    let mut C = ((c >> 1) ^ (b & (d >> 1))) ^ c;
    let mut D = ((a & (c >> 1)) ^ (d >> 1)) ^ d;

    a = A;
    b = B;
    c = C;
    d = D;
    A = (a & (a >> 2)) ^ (b & (b >> 2));
    B = (a & (b >> 2)) ^ (b & ((a ^ b) >> 2));
    C ^= (a & (c >> 2)) ^ (b & (d >> 2));
    D ^= (b & (c >> 2)) ^ ((a ^ b) & (d >> 2));

    a = A;
    b = B;
    c = C;
    d = D;
    A = (a & (a >> 4)) ^ (b & (b >> 4));
    B = (a & (b >> 4)) ^ (b & ((a ^ b) >> 4));
    C ^= (a & (c >> 4)) ^ (b & (d >> 4));
    D ^= (b & (c >> 4)) ^ ((a ^ b) & (d >> 4));

    // Final round and projection
    a = A;
    b = B;
    c = C;
    d = D;
    C ^= (a & (c >> 8)) ^ (b & (d >> 8));
    D ^= (b & (c >> 8)) ^ ((a ^ b) & (d >> 8));

    // Undo transformation prefix scan
    a = C ^ (C >> 1);
    b = D ^ (D >> 1);

    // Recover index bits
    let i0 = x ^ y;
    let i1 = b | (0xFFFF ^ (i0 | a));

    (interleave(i1) << 1) | interleave(i0)
}
