//! Double-buffered drawable state
//!
//! The stepping thread fills the back [`Frame`] and publishes it by swapping
//! an `Arc` under a mutex. Observers clone the front `Arc` under the same
//! mutex and read it without holding any lock, so a frame they hold never
//! changes underneath them.
//!
//! ```text
//!   stepping thread                        observer thread
//!   ───────────────                        ───────────────
//!   fill back frame
//!   publish(): lock { front <-> back }     latest(): lock { clone front }
//!   recycle old front if unshared          read frame at leisure
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::abi::{Real, Vector};
use crate::object::{ObjectId, ObjectKind};

/// Drawable state of one object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectFrame {
    pub id: ObjectId,
    pub type_name: String,
    pub kind: ObjectKind,
    pub position: Vector,
    pub rotation: Real,
    pub velocity: Vector,
    pub visible: bool,
    /// Marked for removal during the step that produced the frame
    pub pending_removal: bool,
    pub values: IndexMap<String, Real>,
    pub state: Option<serde_json::Value>,
}

/// Drawable state of one module
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleFrame {
    pub name: String,
    pub state: serde_json::Value,
}

/// Complete drawable state after one step
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Frame {
    pub iteration: u64,
    pub time: Real,
    pub world_size: Vector,
    pub objects: Vec<ObjectFrame>,
    pub modules: Vec<ModuleFrame>,
}

impl Frame {
    /// Reset for reuse, keeping allocations
    pub fn clear(&mut self) {
        self.iteration = 0;
        self.time = 0.0;
        self.world_size = Vector::ZERO;
        self.objects.clear();
        self.modules.clear();
    }

    pub fn object(&self, id: ObjectId) -> Option<&ObjectFrame> {
        self.objects.iter().find(|o| o.id == id)
    }
}

type Front = Arc<Mutex<Arc<Frame>>>;

/// Writer side of the frame double buffer, owned by the simulation
pub struct DrawBuffer {
    back: Frame,
    front: Front,
    published: u64,
}

impl DrawBuffer {
    pub fn new() -> Self {
        Self {
            back: Frame::default(),
            front: Arc::new(Mutex::new(Arc::new(Frame::default()))),
            published: 0,
        }
    }

    /// Frame being written by the current step
    pub fn back_mut(&mut self) -> &mut Frame {
        &mut self.back
    }

    /// Make the back frame visible to observers
    pub fn publish(&mut self) {
        let frame = Arc::new(std::mem::take(&mut self.back));
        let old = std::mem::replace(&mut *self.front.lock(), frame);
        self.published += 1;

        // Reuse the previous front unless an observer still holds it
        if let Ok(mut frame) = Arc::try_unwrap(old) {
            frame.clear();
            self.back = frame;
        }
    }

    /// Number of frames published so far
    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn latest(&self) -> Arc<Frame> {
        self.front.lock().clone()
    }

    /// Create an observer handle
    pub fn reader(&self) -> FrameReader {
        FrameReader {
            front: self.front.clone(),
        }
    }
}

impl Default for DrawBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of the frame double buffer, cheap to clone and `Send`
#[derive(Clone)]
pub struct FrameReader {
    front: Front,
}

impl FrameReader {
    /// Most recently published frame
    pub fn latest(&self) -> Arc<Frame> {
        self.front.lock().clone()
    }
}
