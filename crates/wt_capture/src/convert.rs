use wt_platform::{PixelBuffer, PixelLayout, Rect, Snapshot};

/// Copies 32-bit pixels into RGBA8, swapping channels and forcing alpha in the same pass.
#[inline]
pub fn copy_rows(src: &[u8], dst: &mut [u8], layout: PixelLayout, keep_alpha: bool) {
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        match layout {
            PixelLayout::Bgra => {
                d[0] = s[2];
                d[1] = s[1];
                d[2] = s[0];
            }
            PixelLayout::Rgba => d[..3].copy_from_slice(&s[..3]),
        }
        d[3] = if keep_alpha { s[3] } else { 0xFF };
    }
}

/// Cuts `rect` out of a snapshot.
///
/// Coordinates are in the snapshot's surface space. Parts of `rect` outside the snapshot bounds
/// stay zero.
pub fn copy_from_snapshot(snapshot: &dyn Snapshot, rect: Rect) -> PixelBuffer {
    let mut out = PixelBuffer::zeroed(rect.width as u32, rect.height as u32);
    let bounds = snapshot.bounds();
    let Some(visible) = rect.intersection(&bounds) else {
        return out;
    };

    let data = snapshot.data();
    let stride = snapshot.stride();
    let layout = snapshot.layout();
    let keep_alpha = snapshot.has_alpha();
    let row_bytes = visible.width as usize * 4;
    let src_col = (visible.x - bounds.x) as usize * 4;
    let dst_col = (visible.x - rect.x) as usize * 4;

    for y in visible.y..visible.bottom() {
        let src_start = (y - bounds.y) as usize * stride + src_col;
        let Some(src) = data.get(src_start..src_start + row_bytes) else {
            break;
        };
        let row = out.row_mut((y - rect.y) as u32);
        copy_rows(src, &mut row[dst_col..dst_col + row_bytes], layout, keep_alpha);
    }
    out
}
