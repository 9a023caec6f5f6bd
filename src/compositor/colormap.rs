use image::Rgb;
use once_cell::sync::Lazy;

fn ramp(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// JET color for `x` in [0, 1]: dark blue → cyan → yellow → dark red.
pub fn jet(x: f64) -> Rgb<u8> {
    let x = x.clamp(0.0, 1.0);
    Rgb([
        ramp(1.5 - (4.0 * x - 3.0).abs()),
        ramp(1.5 - (4.0 * x - 2.0).abs()),
        ramp(1.5 - (4.0 * x - 1.0).abs()),
    ])
}

static JET_LUT: Lazy<[Rgb<u8>; 256]> = Lazy::new(|| {
    let mut lut = [Rgb([0, 0, 0]); 256];
    for (level, color) in lut.iter_mut().enumerate() {
        *color = jet(level as f64 / 255.0);
    }
    lut
});

/// Color of one of the 256 quantization levels.
pub fn jet_level(level: u8) -> Rgb<u8> {
    JET_LUT[level as usize]
}
