/// Integer pixel location (column, row)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PixelCoord {
    pub x: usize,
    pub y: usize,
}

impl PixelCoord {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    pub fn to_f32(self) -> [f32; 2] {
        [self.x as f32, self.y as f32]
    }
}

/// Slot of a batch-padded candidate list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeypointSlot {
    Detected(PixelCoord),
    Absent,
}

impl KeypointSlot {
    pub fn position(&self) -> Option<PixelCoord> {
        match self {
            KeypointSlot::Detected(p) => Some(*p),
            KeypointSlot::Absent => None,
        }
    }

    /// Coordinates as fed to a sampler; padding reads as the origin.
    pub fn padded_xy(&self) -> [f32; 2] {
        self.position().map(PixelCoord::to_f32).unwrap_or([0.0, 0.0])
    }

    /// Absent slots and origin detections are never valid sparse keypoints.
    pub fn is_scorable(&self) -> bool {
        matches!(self, KeypointSlot::Detected(p) if p.x != 0 || p.y != 0)
    }
}

/// Candidate with its detection score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

/// One level of the dense extraction pyramid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleLevel {
    pub level: usize,
    /// Resize factor applied to the input image
    pub factor: f32,
    /// Feature budget of this level
    pub top_k: usize,
}

impl ScaleLevel {
    /// Tag attached to every feature of this level.
    pub fn scale_tag(&self) -> f32 {
        1.0 / self.factor
    }
}

/// Geometry of a preprocessed batch relative to the caller's images
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageFrame {
    /// Preprocessed (multiple of 32) height
    pub height: usize,
    /// Preprocessed (multiple of 32) width
    pub width: usize,
    /// Original height / preprocessed height
    pub rh: f32,
    /// Original width / preprocessed width
    pub rw: f32,
}

impl ImageFrame {
    /// Frame of an input that needs no resizing.
    pub fn identity(height: usize, width: usize) -> Self {
        Self { height, width, rh: 1.0, rw: 1.0 }
    }

    /// Map a preprocessed-frame coordinate back to original image pixels.
    pub fn to_original(&self, x: f32, y: f32) -> [f32; 2] {
        [x * self.rw, y * self.rh]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_scorability() {
        assert!(!KeypointSlot::Absent.is_scorable());
        assert!(!KeypointSlot::Detected(PixelCoord::new(0, 0)).is_scorable());
        assert!(KeypointSlot::Detected(PixelCoord::new(0, 3)).is_scorable());
        assert_eq!(KeypointSlot::Absent.padded_xy(), [0.0, 0.0]);
    }

    #[test]
    fn test_frame_rescale() {
        let frame = ImageFrame { height: 32, width: 64, rh: 1.5, rw: 2.0 };
        assert_eq!(frame.to_original(10.0, 4.0), [20.0, 6.0]);
        assert_eq!(ImageFrame::identity(32, 32).to_original(3.0, 7.0), [3.0, 7.0]);
    }
}
