#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Built-in Components
//!
//! The small set of components that ships with the backend itself:
//! the manual trigger, file loader, HTTP request, the two human gates
//! (approval and selection), and an IP reachability check that doubles
//! as the reference agent tool. Security-tool components (subfinder,
//! amass, ...) are external plugins and register themselves through
//! the same [`cascade_component::ComponentRegistry`].

pub mod files;
pub mod gates;
pub mod http;
pub mod net;
pub mod trigger;

use cascade_component::{ComponentRegistry, DuplicateId};

/// Build a registry with every built-in component registered.
pub fn builtin_registry() -> Result<ComponentRegistry, DuplicateId> {
    let mut registry = ComponentRegistry::new();
    registry.register(trigger::manual_trigger())?;
    registry.register(files::file_loader())?;
    registry.register(http::http_request())?;
    registry.register(gates::approval_gate())?;
    registry.register(gates::manual_select())?;
    registry.register(net::ip_check())?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_contains_all_builtins() {
        let registry = builtin_registry().unwrap();
        for id in [
            "manual.trigger",
            "file.loader",
            "http.request",
            "approval.gate",
            "manual.select",
            "net.ip_check",
        ] {
            assert!(registry.contains(id), "missing {id}");
        }
    }

    #[test]
    fn exactly_one_builtin_trigger() {
        let registry = builtin_registry().unwrap();
        let triggers = registry.list().filter(|d| d.is_trigger()).count();
        assert_eq!(triggers, 1);
    }
}
