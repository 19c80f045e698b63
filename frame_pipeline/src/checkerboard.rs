/// Procedural checkerboard texture

/// Cells per row of the checkerboard
pub const CHECKER_CELLS: u32 = 8;

const BLACK: [u8; 4] = [0x00, 0x00, 0x00, 0xFF];
const WHITE: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// Generate a `width x height` checkerboard, `pixel_size` bytes per pixel
///
/// Cells are `width / 8` pixels on each side (the width drives both
/// dimensions). Cell `(i, j)` is opaque black when `i % 2 == j % 2`, opaque
/// white otherwise. Pixels wider than 4 bytes repeat the RGBA pattern;
/// narrower ones keep its leading bytes.
pub fn generate_checkerboard(width: u32, height: u32, pixel_size: u32) -> Vec<u8> {
    let cell = (width / CHECKER_CELLS).max(1) as usize;
    let pixel_size = pixel_size as usize;
    let mut data = vec![0u8; width as usize * height as usize * pixel_size];
    if pixel_size == 0 {
        return data;
    }

    let row_bytes = width as usize * pixel_size;
    for (n, pixel) in data.chunks_exact_mut(pixel_size).enumerate() {
        let byte = n * pixel_size;
        let x = (byte % row_bytes) / pixel_size;
        let y = byte / row_bytes;
        let i = x / cell;
        let j = y / cell;

        let color = if i % 2 == j % 2 { &BLACK } else { &WHITE };
        for (k, b) in pixel.iter_mut().enumerate() {
            *b = color[k % 4];
        }
    }
    data
}

#[cfg(test)]
#[path = "checkerboard_tests.rs"]
mod tests;
