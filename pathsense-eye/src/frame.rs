//! Raw sensor frames: planar YUV input, packed RGB rasters, grid rotation

use crate::error::VisionError;

/// Rotation applied to a frame before analysis, in degrees clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Map a sensor-reported rotation (degrees) onto the supported set.
    pub fn from_degrees(degrees: u32) -> Result<Self, VisionError> {
        match degrees % 360 {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(VisionError::Processing(format!(
                "Unsupported rotation: {}",
                other
            ))),
        }
    }

    /// True for rotations that swap frame width and height.
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Planar YUV 4:2:0 buffers as delivered by the capture source.
///
/// Each plane carries its own row stride; the chroma planes additionally carry a
/// pixel stride so both semi-planar and fully planar layouts are accepted.
#[derive(Debug, Clone)]
pub struct YuvPlanes {
    pub width: usize,
    pub height: usize,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
    pub y_row_stride: usize,
    pub uv_row_stride: usize,
    pub uv_pixel_stride: usize,
}

/// Packed RGB8 raster, row-major, three bytes per pixel.
#[derive(Debug, Clone)]
pub struct RgbFrame {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

/// One frame from the capture source, with the rotation that must be applied
/// before any model sees it.
#[derive(Debug, Clone)]
pub struct SensorFrame {
    pub yuv: YuvPlanes,
    pub rotation: Rotation,
}

impl YuvPlanes {
    fn validate(&self) -> Result<(), VisionError> {
        if self.width == 0 || self.height == 0 {
            return Err(VisionError::Processing(
                "Frame dimensions cannot be zero".to_string(),
            ));
        }
        if self.y_row_stride < self.width {
            return Err(VisionError::Processing(
                "Luma row stride smaller than frame width".to_string(),
            ));
        }
        if self.uv_pixel_stride == 0 {
            return Err(VisionError::Processing(
                "Chroma pixel stride cannot be zero".to_string(),
            ));
        }
        let y_needed = (self.height - 1) * self.y_row_stride + self.width;
        if self.y.len() < y_needed {
            return Err(VisionError::Processing(format!(
                "Luma plane too small: {} < {}",
                self.y.len(),
                y_needed
            )));
        }
        // The last chroma sample read sits at row (height-1)/2, column (width-1)/2.
        let uv_needed = ((self.height - 1) / 2) * self.uv_row_stride
            + ((self.width - 1) / 2) * self.uv_pixel_stride
            + 1;
        if self.u.len() < uv_needed || self.v.len() < uv_needed {
            return Err(VisionError::Processing(format!(
                "Chroma plane too small: {}/{} < {}",
                self.u.len(),
                self.v.len(),
                uv_needed
            )));
        }
        Ok(())
    }

    /// Convert to a packed RGB raster using integer BT.601 coefficients.
    pub fn to_rgb(&self) -> Result<RgbFrame, VisionError> {
        self.validate()?;

        let (w, h) = (self.width, self.height);
        let mut data = vec![0u8; w * h * 3];

        for j in 0..h {
            let p_y = j * self.y_row_stride;
            let p_uv = (j / 2) * self.uv_row_stride;
            let out_row = j * w * 3;
            for i in 0..w {
                let y = self.y[p_y + i] as i32;
                let u = self.u[p_uv + (i / 2) * self.uv_pixel_stride] as i32;
                let v = self.v[p_uv + (i / 2) * self.uv_pixel_stride] as i32;

                let c = y - 16;
                let d = u - 128;
                let e = v - 128;
                let r = clamp_u8((298 * c + 409 * e + 128) >> 8);
                let g = clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8);
                let b = clamp_u8((298 * c + 516 * d + 128) >> 8);

                let idx = out_row + i * 3;
                data[idx] = r;
                data[idx + 1] = g;
                data[idx + 2] = b;
            }
        }

        Ok(RgbFrame {
            width: w,
            height: h,
            data,
        })
    }
}

impl RgbFrame {
    /// Create a zero-filled frame.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width * height * 3],
        }
    }

    /// Read one pixel as `(r, g, b)`. Caller guarantees bounds.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> (u8, u8, u8) {
        let idx = (y * self.width + x) * 3;
        (self.data[idx], self.data[idx + 1], self.data[idx + 2])
    }

    #[inline]
    fn put_pixel(&mut self, x: usize, y: usize, px: (u8, u8, u8)) {
        let idx = (y * self.width + x) * 3;
        self.data[idx] = px.0;
        self.data[idx + 1] = px.1;
        self.data[idx + 2] = px.2;
    }

    /// Rotate the pixel grid clockwise. Width and height swap for 90/270.
    pub fn rotate(&self, rotation: Rotation) -> RgbFrame {
        let (w, h) = (self.width, self.height);
        match rotation {
            Rotation::None => self.clone(),
            Rotation::Deg90 => {
                let mut dst = RgbFrame::new(h, w);
                for y in 0..h {
                    for x in 0..w {
                        dst.put_pixel(h - 1 - y, x, self.pixel(x, y));
                    }
                }
                dst
            }
            Rotation::Deg180 => {
                let mut dst = RgbFrame::new(w, h);
                for y in 0..h {
                    for x in 0..w {
                        dst.put_pixel(w - 1 - x, h - 1 - y, self.pixel(x, y));
                    }
                }
                dst
            }
            Rotation::Deg270 => {
                let mut dst = RgbFrame::new(h, w);
                for y in 0..h {
                    for x in 0..w {
                        dst.put_pixel(y, w - 1 - x, self.pixel(x, y));
                    }
                }
                dst
            }
        }
    }
}

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}
