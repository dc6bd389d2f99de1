//! V4L2 webcam capture via the `v4l` crate.

use crate::frame::{self, Frame};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
const MAX_PROBED_DEVICES: u32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Anything that yields grayscale frames on demand.
pub trait FrameSource: Send {
    fn grab(&mut self) -> Result<Frame, CameraError>;
    /// Device index this source was opened with.
    fn index(&self) -> u32;
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: u32,
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(PixelFormat::Yuyv)
        } else if fourcc == FourCC::new(b"GREY") {
            Some(PixelFormat::Grey)
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            Some(PixelFormat::Y16)
        } else {
            None
        }
    }
}

/// `/dev/video<index>`
pub fn device_path(index: u32) -> String {
    format!("/dev/video{index}")
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    stream: Option<MmapStream<'static>>,
    index: u32,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open camera `index` (`/dev/video<index>`).
    pub fn open(index: u32) -> Result<Self, CameraError> {
        let path = device_path(index);
        if !Path::new(&path).exists() {
            return Err(CameraError::DeviceNotFound(path));
        }

        let device = Device::new(index as usize).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = %path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or Y16)"
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            stream: None,
            index,
            width: negotiated.width,
            height: negotiated.height,
            device_path: path,
            fourcc,
            pixel_format,
        })
    }

    /// Capture a single frame, converting to grayscale.
    ///
    /// The mmap stream is started on first use and kept running across
    /// calls. A dequeue failure drops it so the next call restarts it.
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let device = &self.device;
        let path = &self.device_path;
        let stream = reuse_or_open(&mut self.stream, || {
            tracing::debug!(device = %path, "starting capture stream");
            MmapStream::with_buffers(device, BufType::VideoCapture, STREAM_BUFFERS).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })
        })?;

        let (format, width, height) = (self.pixel_format, self.width, self.height);
        let captured = stream
            .next()
            .map(|(buf, meta)| (buf_to_grayscale(format, buf, width, height), meta.sequence));

        match captured {
            Ok((gray, sequence)) => Ok(Frame::from_gray(gray?, width, height, sequence)),
            Err(e) => {
                self.stream = None;
                Err(CameraError::CaptureFailed(format!(
                    "failed to dequeue buffer: {e}"
                )))
            }
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for index in 0..MAX_PROBED_DEVICES {
            let path = device_path(index);
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::new(index as usize) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                index,
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// The stream already in `slot`, or a new one from `open` stored there.
fn reuse_or_open<S, E>(
    slot: &mut Option<S>,
    open: impl FnOnce() -> Result<S, E>,
) -> Result<&mut S, E> {
    let stream = match slot.take() {
        Some(stream) => stream,
        None => open()?,
    };
    Ok(slot.insert(stream))
}

fn buf_to_grayscale(
    format: PixelFormat,
    buf: &[u8],
    width: u32,
    height: u32,
) -> Result<Vec<u8>, CameraError> {
    let pixels = (width * height) as usize;
    match format {
        PixelFormat::Grey => {
            if buf.len() < pixels {
                return Err(CameraError::CaptureFailed(format!(
                    "GREY buffer too short: expected {pixels}, got {}",
                    buf.len()
                )));
            }
            Ok(buf[..pixels].to_vec())
        }
        PixelFormat::Y16 => frame::y16_to_grayscale(buf, width, height)
            .map_err(|e| CameraError::CaptureFailed(format!("Y16 conversion failed: {e}"))),
        PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, width, height)
            .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}"))),
    }
}

impl FrameSource for Camera {
    fn grab(&mut self) -> Result<Frame, CameraError> {
        self.capture_frame()
    }

    fn index(&self) -> u32 {
        self.index
    }
}
