// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

mod synthetic; pub use synthetic::*;
use crate::types::*;

/// Planar picture as delivered by a frame source, timestamp in microseconds.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub timestamp_us: Option<u64>,
    pub planes: [Vec<u8>; 3],
    pub strides: [usize; 3],
}

impl RawFrame {
    /// Zeroed, tightly packed frame
    pub fn new(width: u32, height: u32, format: PixelFormat, timestamp_us: Option<u64>) -> Self {
        let mut planes: [Vec<u8>; 3] = Default::default();
        let mut strides = [0usize; 3];
        for i in 0..format.planes() {
            let (w, h) = format.plane_size(i, width, height);
            strides[i] = w as usize;
            planes[i] = vec![0u8; w as usize * h as usize];
        }
        Self { width, height, format, timestamp_us, planes, strides }
    }

    pub fn plane(&self, index: usize) -> &[u8] { &self.planes[index] }
    pub fn plane_mut(&mut self, index: usize) -> &mut [u8] { &mut self.planes[index] }
    pub fn stride(&self, index: usize) -> usize { self.strides[index] }

    fn check_layout(&self) -> Result<(), EncoderError> {
        for i in 0..self.format.planes() {
            let (w, h) = self.format.plane_size(i, self.width, self.height);
            let needed = if h == 0 { 0 } else { self.strides[i] * (h as usize - 1) + w as usize };
            if self.strides[i] < w as usize || self.planes[i].len() < needed {
                return Err(EncoderError::Source(format!("plane {i} of a {}x{} frame is too small ({} bytes, stride {})", self.width, self.height, self.planes[i].len(), self.strides[i])));
            }
        }
        Ok(())
    }
}

pub trait FrameSource {
    fn video_info(&self) -> VideoInfo;

    /// Next frame in source order, `None` once at end of stream.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, EncoderError>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn video_info(&self) -> VideoInfo { (**self).video_info() }
    fn next_frame(&mut self) -> Result<Option<RawFrame>, EncoderError> { (**self).next_frame() }
}

/// Picture handed to the codec. Allocated once per session and refilled for every frame.
#[derive(Debug)]
pub struct Picture {
    width: u32,
    height: u32,
    format: PixelFormat,
    range: ColorRange,
    planes: [Vec<u8>; 3],
    strides: [usize; 3],
}

impl Picture {
    pub fn new(width: u32, height: u32, align: usize, range: ColorRange) -> Result<Self, EncoderError> {
        let format = PixelFormat::YUV420P;
        if width == 0 || height == 0 || !align.is_power_of_two() {
            return Err(EncoderError::PictureAllocation { width, height });
        }
        let mut planes: [Vec<u8>; 3] = Default::default();
        let mut strides = [0usize; 3];
        for i in 0..format.planes() {
            let (w, h) = format.plane_size(i, width, height);
            strides[i] = (w as usize).next_multiple_of(align);
            let size = strides[i].checked_mul(h as usize).ok_or(EncoderError::PictureAllocation { width, height })?;
            planes[i].try_reserve_exact(size).map_err(|_| EncoderError::PictureAllocation { width, height })?;
            planes[i].resize(size, 0);
        }
        Ok(Self { width, height, format, range, planes, strides })
    }

    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }
    pub fn format(&self) -> PixelFormat { self.format }
    pub fn range(&self) -> ColorRange { self.range }
    pub fn plane(&self, index: usize) -> &[u8] { &self.planes[index] }
    pub fn stride(&self, index: usize) -> usize { self.strides[index] }

    /// Takes over planes and strides of `frame`, reusing the existing allocations.
    pub fn fill_from(&mut self, frame: &RawFrame) -> Result<(), EncoderError> {
        if frame.width != self.width || frame.height != self.height || frame.format != self.format {
            return Err(EncoderError::Source(format!("got a {}x{} {:?} frame, expected {}x{} {:?}", frame.width, frame.height, frame.format, self.width, self.height, self.format)));
        }
        frame.check_layout()?;
        for i in 0..self.format.planes() {
            self.planes[i].clear();
            self.planes[i].extend_from_slice(&frame.planes[i]);
            self.strides[i] = frame.strides[i];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picture_strides_are_aligned() {
        let pic = Picture::new(100, 50, 16, ColorRange::Full).unwrap();
        assert_eq!(pic.stride(0), 112);
        assert_eq!(pic.stride(1), 64);
        assert_eq!(pic.plane(0).len(), 112 * 50);
        assert_eq!(pic.plane(2).len(), 64 * 25);
        assert_eq!(pic.range(), ColorRange::Full);
        assert!(matches!(Picture::new(0, 50, 16, ColorRange::Full), Err(EncoderError::PictureAllocation { .. })));
    }

    #[test]
    fn fill_takes_frame_layout() {
        let mut pic = Picture::new(8, 4, 16, ColorRange::Limited).unwrap();
        let mut frame = RawFrame::new(8, 4, PixelFormat::YUV420P, Some(0));
        frame.plane_mut(0).fill(7);
        pic.fill_from(&frame).unwrap();
        assert_eq!(pic.stride(0), 8);
        assert_eq!(pic.plane(0), &[7u8; 32][..]);

        let other = RawFrame::new(16, 4, PixelFormat::YUV420P, Some(0));
        assert!(matches!(pic.fill_from(&other), Err(EncoderError::Source(_))));

        frame.planes[1].truncate(3);
        assert!(matches!(pic.fill_from(&frame), Err(EncoderError::Source(_))));
    }
}
