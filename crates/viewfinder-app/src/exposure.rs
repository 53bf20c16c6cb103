//! Mean brightness of the previewed frames, measured through the
//! viewfinder's frame tap.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use viewfinder_core::PixelFormat;
use viewfinder_renderer::{FrameTap, TapFrame};

/// Sample every `SAMPLE_STEP`th pixel of every `SAMPLE_STEP`th row.
const SAMPLE_STEP: usize = 8;

/// Latest reading, shared with the UI. `NaN` until a mapped frame arrives.
#[derive(Clone)]
pub struct LumaReading(Arc<AtomicU32>);

impl LumaReading {
    pub fn get(&self) -> Option<f32> {
        let value = f32::from_bits(self.0.load(Ordering::Relaxed));
        (!value.is_nan()).then_some(value)
    }

    pub fn clear(&self) {
        self.0.store(f32::NAN.to_bits(), Ordering::Relaxed);
    }
}

pub struct LumaMeter {
    reading: LumaReading,
}

impl LumaMeter {
    pub fn new() -> (Self, LumaReading) {
        let reading = LumaReading(Arc::new(AtomicU32::new(f32::NAN.to_bits())));
        (Self { reading: reading.clone() }, reading)
    }
}

impl FrameTap for LumaMeter {
    fn handle_frame(&mut self, frame: &TapFrame<'_>) {
        if let Some(luma) = mean_luma(frame, SAMPLE_STEP) {
            self.reading.0.store(luma.to_bits(), Ordering::Relaxed);
        }
    }
}

/// Rec. 601 luma averaged over a sample grid, in `0.0..=1.0`.
pub fn mean_luma(frame: &TapFrame<'_>, step: usize) -> Option<f32> {
    let step = step.max(1);
    let (width, height) = (frame.size.width as usize, frame.size.height as usize);
    let bpp = frame.format.bytes_per_pixel();

    let mut sum = 0.0f64;
    let mut count = 0u32;
    for y in (0..height).step_by(step) {
        let row = frame.data.get(y * frame.stride..)?;
        for x in (0..width).step_by(step) {
            let px = row.get(x * bpp..x * bpp + bpp)?;
            // NV12's first plane is luma already.
            let luma = match frame.format {
                PixelFormat::Nv12 => f64::from(px[0]),
                PixelFormat::Rgba => weigh(px[0], px[1], px[2]),
                PixelFormat::Bgra => weigh(px[2], px[1], px[0]),
            };
            sum += luma;
            count += 1;
        }
    }
    (count > 0).then(|| (sum / f64::from(count) / 255.0) as f32)
}

fn weigh(r: u8, g: u8, b: u8) -> f64 {
    0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)
}
