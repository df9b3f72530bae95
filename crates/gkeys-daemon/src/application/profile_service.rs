//! Profile operations exposed on `com.gkeys.Profiles`.
//!
//! | member           | kind   | in   | out     |
//! |------------------|--------|------|---------|
//! | `ListProfiles`   | method | –    | names   |
//! | `ActiveProfile`  | method | –    | name    |
//! | `Activate`       | method | name | changed |
//! | `ProfileChanged` | signal | name | –       |
//!
//! `Activate` broadcasts `ProfileChanged` after an actual switch, so clients
//! that watch the bus never poll.

use std::sync::Arc;

use gkeys_core::marshal::codec;
use gkeys_core::{
    ArgType, BusAddress, BusSelector, CallError, CallRegistry, Handler, Message, RegistryError,
    ReplyBuilder, ReplySink, SerialCounter,
};
use tracing::{debug, warn};

use crate::application::device::KeyboardDevice;

/// Interface every profile member lives on.
pub const INTERFACE: &str = "com.gkeys.Profiles";

/// Registers and services the profile operations.
pub struct ProfileService {
    device: Arc<dyn KeyboardDevice>,
    selector: BusSelector,
    object_path: String,
    sink: Arc<dyn ReplySink>,
    serials: Arc<SerialCounter>,
}

impl ProfileService {
    pub fn new(
        device: Arc<dyn KeyboardDevice>,
        selector: BusSelector,
        object_path: impl Into<String>,
        sink: Arc<dyn ReplySink>,
        serials: Arc<SerialCounter>,
    ) -> Self {
        Self {
            device,
            selector,
            object_path: object_path.into(),
            sink,
            serials,
        }
    }

    fn member(&self, name: &str) -> BusAddress {
        BusAddress::new(self.selector, self.object_path.clone(), INTERFACE, name)
    }

    /// Registers every profile handler.
    pub fn register(&self, registry: &mut CallRegistry) -> Result<(), RegistryError> {
        let device = Arc::clone(&self.device);
        registry.register(Handler::method(
            self.member("ListProfiles"),
            vec![],
            vec![ArgType::StrArray],
            move |_args, reply| {
                reply.append_string_array(device.profiles())?;
                Ok(())
            },
        ))?;

        let device = Arc::clone(&self.device);
        registry.register(Handler::method(
            self.member("ActiveProfile"),
            vec![],
            vec![ArgType::Str],
            move |_args, reply| {
                codec::append_string_arg(reply, &device.active_profile())?;
                Ok(())
            },
        ))?;

        let device = Arc::clone(&self.device);
        let sink = Arc::clone(&self.sink);
        let serials = Arc::clone(&self.serials);
        let changed_addr = self.member("ProfileChanged");
        registry.register(Handler::method(
            self.member("Activate"),
            vec![ArgType::Str],
            vec![ArgType::Bool],
            move |args, reply| {
                let name = args[0]
                    .as_str()
                    .ok_or_else(|| CallError::invalid_args("name"))?;
                let changed = device.activate_profile(name)?;
                reply.append_bool(changed)?;
                if changed {
                    broadcast_profile_changed(&sink, &serials, &changed_addr, name);
                }
                Ok(())
            },
        ))?;

        // Emitted by this service; registered so discovery lists its shape.
        registry.register(Handler::signal(
            self.member("ProfileChanged"),
            vec![ArgType::Str],
            |args, _| {
                if let Some(name) = args[0].as_str() {
                    debug!("peer echoed ProfileChanged: {name}");
                }
                Ok(())
            },
        ))?;

        Ok(())
    }
}

fn broadcast_profile_changed(
    sink: &Arc<dyn ReplySink>,
    serials: &SerialCounter,
    address: &BusAddress,
    name: &str,
) {
    let mut builder = ReplyBuilder::new();
    let body = codec::append_string_arg(&mut builder, name).and_then(|_| builder.into_body());
    match body {
        Ok(body) => {
            let signal = Message::signal(address.clone(), serials.next(), body);
            if let Err(e) = sink.send(signal) {
                warn!("could not broadcast ProfileChanged: {e}");
            }
        }
        Err(e) => warn!("could not build ProfileChanged signal: {e}"),
    }
}
