// THEORY:
// The `pixel` module is the smallest unit of the engine: how one RGBA pixel of
// a flat frame buffer is read, and the single-pixel heuristic the detector
// needs, brightness. Brightness is the unweighted mean of R, G and B. Alpha
// keeps a pixel aligned to four bytes of the buffer but nothing reads it.

pub mod pixel {
    pub type Byte = u8;
    pub type Channel = Byte;
    pub type Brightness = f64;

    pub const CHANNELS: usize = 4;

    /// `(R + G + B) / 3` as a float, so `> threshold` compares exactly the same
    /// way for fractional thresholds.
    #[inline]
    pub fn brightness(red: Channel, green: Channel, blue: Channel) -> Brightness {
        (red as u16 + green as u16 + blue as u16) as f64 / 3.0
    }

    /// Brightness of the pixel starting at `byte_index` in an RGBA buffer.
    #[inline]
    pub fn brightness_at(buffer: &[Byte], byte_index: usize) -> Brightness {
        brightness(
            buffer[byte_index],
            buffer[byte_index + 1],
            buffer[byte_index + 2],
        )
    }
}
