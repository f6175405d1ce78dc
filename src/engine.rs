//! Local playback engine.
//!
//! The engine is the component that actually renders audio and registers a
//! device with the provider. It is driven by the
//! [`Controller`](crate::remote::Controller) and reports back through an
//! event channel.
//!
//! [`Attached`] is an engine for environments that cannot render audio
//! themselves: it adopts a device that is already registered with the
//! provider, such as a desktop or phone client, and lets the controller
//! steer that device.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{error::Result, events::Event};

#[async_trait]
pub trait Engine: Send + Sync {
    /// Loads the engine. Called once before connecting.
    async fn load(&self) -> Result<()>;

    /// Connects to the provider with `token`. Returns whether the engine
    /// accepted the connection request; readiness follows as an
    /// [`Event::Ready`].
    async fn connect(&self, token: &str) -> Result<bool>;

    /// Tears the connection down without any network activity.
    fn disconnect(&self);
}

#[async_trait]
impl<T: Engine + ?Sized> Engine for std::sync::Arc<T> {
    async fn load(&self) -> Result<()> {
        (**self).load().await
    }

    async fn connect(&self, token: &str) -> Result<bool> {
        (**self).connect(token).await
    }

    fn disconnect(&self) {
        (**self).disconnect();
    }
}

/// An engine adopting an existing provider device.
pub struct Attached {
    device_id: String,
    events: mpsc::UnboundedSender<Event>,
}

impl Attached {
    /// Creates the engine and the receiving end of its event channel.
    #[must_use]
    pub fn new(device_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let engine = Self {
            device_id: device_id.into(),
            events,
        };
        (engine, receiver)
    }
}

#[async_trait]
impl Engine for Attached {
    async fn load(&self) -> Result<()> {
        Ok(())
    }

    async fn connect(&self, _token: &str) -> Result<bool> {
        debug!("attaching to device {}", self.device_id);

        // Without a receiver nobody will ever see the device become ready.
        Ok(self
            .events
            .send(Event::Ready {
                device_id: self.device_id.clone(),
            })
            .is_ok())
    }

    fn disconnect(&self) {
        debug!("detaching from device {}", self.device_id);
        let _ = self.events.send(Event::NotReady {
            device_id: self.device_id.clone(),
        });
    }
}
