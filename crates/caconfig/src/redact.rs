//! Placeholders written in place of secret material when a config is serialized.

use caconfig_core::LoadedIdentity;
use serde_yaml::{Mapping, Value};

/// Stands in for any file path that points at secret or identity material
pub const PATH_PLACEHOLDER: &str = "<add_path>";

/// Stands in for engine identifiers and key names
pub const NAME_PLACEHOLDER: &str = "<add_name>";

/// Template for one identity: `cert` always, then `key` or the engine stub
/// depending on where the private key lives. Passwords are never emitted.
pub fn identity_template(identity: &LoadedIdentity) -> Value {
    let mut template = Mapping::new();
    template.insert("cert".into(), PATH_PLACEHOLDER.into());

    match identity.private_key() {
        Some(key) if key.in_hardware() => {
            let mut engine = Mapping::new();
            engine.insert("so_path".into(), PATH_PLACEHOLDER.into());
            engine.insert("id".into(), NAME_PLACEHOLDER.into());
            template.insert("engine".into(), Value::Mapping(engine));
            template.insert("key_name".into(), NAME_PLACEHOLDER.into());
        }
        Some(_) => {
            template.insert("key".into(), PATH_PLACEHOLDER.into());
        }
        None => {}
    }

    Value::Mapping(template)
}
