pub const TEXTURE_WIDTH: u32 = 256;
pub const TEXTURE_HEIGHT: u32 = 256;
pub const TEXTURE_PIXEL_SIZE: u32 = 4;

/// Cells across one texture row.
pub const CHECKERBOARD_CELLS: u32 = 8;

pub const WHITE: u32 = 0xFFFF_FFFF;
pub const OPAQUE_BLACK: u32 = 0x0000_00FF;

/// Black and white checkerboard texture with 8 cells per row.
///
/// Cell rows are as tall as cells are wide in a square texture: the row height
/// is derived from the texture *width*, so non-square textures get square
/// cells rather than 8 cell rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkerboard {
    width: u32,
    height: u32,
    cell_pitch: u64,
    cell_height: u32,
}

impl Default for Checkerboard {
    fn default() -> Self {
        Self::new(TEXTURE_WIDTH, TEXTURE_HEIGHT)
    }
}

impl Checkerboard {
    pub fn new(width: u32, height: u32) -> Self {
        let row_pitch = u64::from(width) * u64::from(TEXTURE_PIXEL_SIZE);
        Self {
            width,
            height,
            cell_pitch: (row_pitch / u64::from(CHECKERBOARD_CELLS)).max(1),
            cell_height: (width / CHECKERBOARD_CELLS).max(1),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn row_pitch(&self) -> usize {
        self.width as usize * TEXTURE_PIXEL_SIZE as usize
    }

    /// Size of [`generate`](Self::generate)'s output.
    pub fn byte_len(&self) -> usize {
        self.row_pitch() * self.height as usize
    }

    /// Width of one cell in pixels.
    pub fn cell_width(&self) -> u32 {
        // At most u32::MAX / CHECKERBOARD_CELLS.
        (self.cell_pitch / u64::from(TEXTURE_PIXEL_SIZE)).max(1) as u32
    }

    pub fn cell_height(&self) -> u32 {
        self.cell_height
    }

    /// Pixel at (`x`, `y`) packed big-endian from its bytes, so white is
    /// `0xFFFFFFFF` and opaque black is `0x000000FF`.
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        let column = u64::from(x) * u64::from(TEXTURE_PIXEL_SIZE) / self.cell_pitch;
        let row = u64::from(y / self.cell_height);
        if column % 2 == row % 2 {
            WHITE
        } else {
            OPAQUE_BLACK
        }
    }

    /// Tightly packed texel data, `row_pitch() * height()` bytes.
    pub fn generate(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.byte_len());
        for y in 0..self.height {
            for x in 0..self.width {
                data.extend_from_slice(&self.pixel(x, y).to_be_bytes());
            }
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_white() {
        assert_eq!(Checkerboard::default().pixel(0, 0), WHITE);
    }

    #[test]
    fn one_cell_to_the_right_is_black() {
        let board = Checkerboard::default();
        assert_eq!(board.cell_width(), 32);
        assert_eq!(board.pixel(board.cell_width(), 0), OPAQUE_BLACK);
        assert_eq!(board.pixel(board.cell_width() - 1, 0), WHITE);
    }

    #[test]
    fn parity_of_row_and_column_decides_colour() {
        let board = Checkerboard::default();
        let cell = board.cell_width();
        assert_eq!(board.pixel(0, cell), OPAQUE_BLACK);
        assert_eq!(board.pixel(cell, cell), WHITE);
        assert_eq!(board.pixel(2 * cell + 5, 3 * cell + 1), OPAQUE_BLACK);
        assert_eq!(board.pixel(255, 255), WHITE);
    }

    #[test]
    fn row_height_follows_texture_width() {
        let board = Checkerboard::new(64, 256);
        assert_eq!(board.cell_height(), 8);
        assert_eq!(board.pixel(0, 8), OPAQUE_BLACK);
    }

    #[test]
    fn generated_bytes_match_pixels() {
        let board = Checkerboard::default();
        let data = board.generate();
        assert_eq!(data.len(), 256 * 256 * 4);
        assert_eq!(data.len(), board.byte_len());
        assert_eq!(&data[0..4], &[0xFF, 0xFF, 0xFF, 0xFF]);

        let offset = (board.cell_width() * TEXTURE_PIXEL_SIZE) as usize;
        assert_eq!(&data[offset..offset + 4], &[0x00, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn large_boards_size_and_sample_without_overflow() {
        let board = Checkerboard::new(40_000, 40_000);
        assert_eq!(board.row_pitch(), 160_000);
        assert_eq!(board.byte_len() as u64, 6_400_000_000);
        assert_eq!(board.cell_width(), 5_000);
        assert_eq!(board.pixel(5_000, 0), OPAQUE_BLACK);
        assert_eq!(board.pixel(39_999, 39_999), WHITE);

        let widest = Checkerboard::new(u32::MAX, 1);
        assert_eq!(widest.row_pitch() as u64, u64::from(u32::MAX) * 4);
        assert_eq!(widest.pixel(0, 0), WHITE);
        assert_eq!(widest.pixel(3 * (widest.cell_width() / 2), 0), OPAQUE_BLACK);
    }

    #[test]
    fn tiny_textures_do_not_divide_by_zero() {
        let board = Checkerboard::new(2, 2);
        assert_eq!(board.generate().len(), 16);
    }
}
