//! Key mapping operations exposed on `com.gkeys.Mapping`.
//!
//! | member          | kind   | in        | out  |
//! |-----------------|--------|-----------|------|
//! | `GetMapping`    | method | key       | code |
//! | `SetMapping`    | method | key, code | –    |
//! | `ResetMappings` | method | keys      | –    |

use std::sync::Arc;

use gkeys_core::{
    ArgType, BusAddress, BusSelector, CallError, CallRegistry, Handler, RegistryError,
};

use crate::application::device::KeyboardDevice;

/// Interface every mapping member lives on.
pub const INTERFACE: &str = "com.gkeys.Mapping";

/// Registers and services the key-mapping operations.
pub struct MappingService {
    device: Arc<dyn KeyboardDevice>,
    selector: BusSelector,
    object_path: String,
}

impl MappingService {
    pub fn new(
        device: Arc<dyn KeyboardDevice>,
        selector: BusSelector,
        object_path: impl Into<String>,
    ) -> Self {
        Self {
            device,
            selector,
            object_path: object_path.into(),
        }
    }

    fn member(&self, name: &str) -> BusAddress {
        BusAddress::new(self.selector, self.object_path.clone(), INTERFACE, name)
    }

    /// Registers every mapping handler.
    pub fn register(&self, registry: &mut CallRegistry) -> Result<(), RegistryError> {
        let device = Arc::clone(&self.device);
        registry.register(Handler::method(
            self.member("GetMapping"),
            vec![ArgType::MKey],
            vec![ArgType::U16],
            move |args, reply| {
                let key = args[0]
                    .as_mkey()
                    .ok_or_else(|| CallError::invalid_args("key"))?;
                reply.append_u16(device.mapping(key))?;
                Ok(())
            },
        ))?;

        let device = Arc::clone(&self.device);
        registry.register(Handler::method(
            self.member("SetMapping"),
            vec![ArgType::MKey, ArgType::U16],
            vec![],
            move |args, _reply| {
                let key = args[0]
                    .as_mkey()
                    .ok_or_else(|| CallError::invalid_args("key"))?;
                let code = args[1]
                    .as_u16()
                    .ok_or_else(|| CallError::invalid_args("code"))?;
                device.set_mapping(key, code);
                Ok(())
            },
        ))?;

        let device = Arc::clone(&self.device);
        registry.register(Handler::method(
            self.member("ResetMappings"),
            vec![ArgType::MKeyArray],
            vec![],
            move |args, _reply| {
                let keys = args[0]
                    .as_mkey_array()
                    .ok_or_else(|| CallError::invalid_args("keys"))?;
                device.reset_mappings(keys);
                Ok(())
            },
        ))?;

        Ok(())
    }
}
