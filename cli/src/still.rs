//! Camera stand-in that serves one decoded image file.

use caselog_capture::{CameraDevice, CameraStream, StreamRequest, VideoFrame, device::CameraFut};

pub struct StillImageCamera {
    frame: VideoFrame,
}

impl StillImageCamera {
    pub fn new(frame: VideoFrame) -> Self {
        Self { frame }
    }
}

impl CameraDevice for StillImageCamera {
    fn open<'a>(&'a self, request: &'a StreamRequest) -> CameraFut<'a> {
        Box::pin(async move {
            tracing::debug!(
                width = self.frame.width(),
                height = self.frame.height(),
                ideal_width = request.ideal_width,
                "Opening still image as camera stream"
            );
            Ok(Box::new(StillStream {
                frame: Some(self.frame.clone()),
            }) as Box<dyn CameraStream>)
        })
    }
}

struct StillStream {
    frame: Option<VideoFrame>,
}

impl CameraStream for StillStream {
    fn current_frame(&mut self) -> Option<VideoFrame> {
        self.frame.clone()
    }

    fn stop(&mut self) {
        self.frame = None;
    }
}
