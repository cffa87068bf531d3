pub const COLOR_TRANSPARENT: u32 = 0x0000_0000;
pub const COLOR_WHITE: u32 = 0xffff_ffff;

const BRIGHTNESS_THRESHOLD: f64 = 170.0;

fn channels(color: u32) -> [u32; 3] {
    [(color >> 16) & 0xff, (color >> 8) & 0xff, color & 0xff]
}

/// Perceived brightness check used to pick label contrast over task colors.
pub fn is_bright_color(color: u32) -> bool {
    match color {
        COLOR_TRANSPARENT => false,
        COLOR_WHITE => true,
        _ => {
            let [r, g, b] = channels(color).map(f64::from);
            let brightness = (r * r * 0.241 + g * g * 0.691 + b * b * 0.068).sqrt();
            brightness >= BRIGHTNESS_THRESHOLD
        }
    }
}
