//! Discovery document generation.
//!
//! A discovery document enumerates, for one object path, every
//! introspectable handler grouped by interface, with the declared type and
//! direction of each argument.  It is a pure function of current registry
//! state: nothing is cached, so a rebuild after registry changes always
//! reflects them.

use std::collections::BTreeMap;

use crate::registry::{CallRegistry, Handler, HandlerKind};

/// Renders the discovery document for every introspectable handler whose
/// address matches `object_path`.
///
/// Interfaces and members are emitted in lexicographic order so the output
/// is stable across rebuilds.
pub fn build_document(registry: &CallRegistry, object_path: &str) -> String {
    // interface name → members sorted by name
    let mut interfaces: BTreeMap<&str, BTreeMap<&str, &Handler>> = BTreeMap::new();
    for handler in registry.handlers() {
        if !handler.is_introspectable() || handler.address().path != object_path {
            continue;
        }
        interfaces
            .entry(&handler.address().interface)
            .or_default()
            .insert(&handler.address().member, handler);
    }

    let mut doc = String::new();
    doc.push_str(&format!("<node name=\"{object_path}\">\n"));
    for (interface, members) in &interfaces {
        doc.push_str(&format!("  <interface name=\"{interface}\">\n"));
        for (member, handler) in members {
            match handler.kind() {
                HandlerKind::Method | HandlerKind::AsyncMethod => {
                    doc.push_str(&format!("    <method name=\"{member}\">\n"));
                    for arg in handler.args_in() {
                        doc.push_str(&format!(
                            "      <arg type=\"{}\" direction=\"in\"/>\n",
                            arg.type_code()
                        ));
                    }
                    for arg in handler.args_out() {
                        doc.push_str(&format!(
                            "      <arg type=\"{}\" direction=\"out\"/>\n",
                            arg.type_code()
                        ));
                    }
                    doc.push_str("    </method>\n");
                }
                HandlerKind::Signal => {
                    doc.push_str(&format!("    <signal name=\"{member}\">\n"));
                    for arg in handler.args_in() {
                        doc.push_str(&format!("      <arg type=\"{}\"/>\n", arg.type_code()));
                    }
                    doc.push_str("    </signal>\n");
                }
            }
        }
        doc.push_str("  </interface>\n");
    }
    doc.push_str("</node>\n");
    doc
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{BusAddress, BusSelector};
    use crate::registry::{ArgType, Handler};

    const PATH: &str = "/com/gkeys/Keyboard";

    fn addr(interface: &str, member: &str) -> BusAddress {
        BusAddress::new(BusSelector::System, PATH, interface, member)
    }

    #[test]
    fn test_document_lists_methods_with_argument_directions() {
        let mut registry = CallRegistry::new();
        registry
            .register(Handler::method(
                addr("com.gkeys.Macros", "GetMacro"),
                vec![ArgType::MKey, ArgType::Byte],
                vec![ArgType::Byte, ArgType::MacroSequence],
                |_, _| Ok(()),
            ))
            .unwrap();

        let doc = build_document(&registry, PATH);

        assert!(doc.contains("<interface name=\"com.gkeys.Macros\">"));
        assert!(doc.contains("<method name=\"GetMacro\">"));
        assert!(doc.contains("<arg type=\"y\" direction=\"in\"/>"));
        assert!(doc.contains("<arg type=\"a(yyq)\" direction=\"out\"/>"));
    }

    #[test]
    fn test_document_lists_signals_without_direction() {
        let mut registry = CallRegistry::new();
        registry
            .register(Handler::signal(
                addr("com.gkeys.Profiles", "ProfileChanged"),
                vec![ArgType::Str],
                |_, _| Ok(()),
            ))
            .unwrap();

        let doc = build_document(&registry, PATH);

        assert!(doc.contains("<signal name=\"ProfileChanged\">"));
        assert!(doc.contains("<arg type=\"s\"/>"));
        assert!(!doc.contains("direction"));
    }

    #[test]
    fn test_non_introspectable_handlers_are_excluded() {
        let mut registry = CallRegistry::new();
        registry
            .register(
                Handler::method(addr("com.gkeys.Debug", "Peek"), vec![], vec![], |_, _| Ok(()))
                    .hidden(),
            )
            .unwrap();

        let doc = build_document(&registry, PATH);

        assert!(!doc.contains("Peek"));
        assert!(!doc.contains("com.gkeys.Debug"));
    }

    #[test]
    fn test_handlers_on_other_paths_are_excluded() {
        let mut registry = CallRegistry::new();
        registry
            .register(Handler::method(
                BusAddress::new(BusSelector::System, "/other", "com.gkeys.X", "Y"),
                vec![],
                vec![],
                |_, _| Ok(()),
            ))
            .unwrap();

        let doc = build_document(&registry, PATH);

        assert!(!doc.contains("com.gkeys.X"));
    }

    #[test]
    fn test_document_reflects_registry_mutation() {
        // Nothing may be cached across registry changes.
        let mut registry = CallRegistry::new();
        registry
            .register(Handler::method(
                addr("com.gkeys.Macros", "GetMacro"),
                vec![],
                vec![],
                |_, _| Ok(()),
            ))
            .unwrap();
        assert!(build_document(&registry, PATH).contains("GetMacro"));

        registry.unregister_all();

        let doc = build_document(&registry, PATH);
        assert!(!doc.contains("GetMacro"));
    }

    #[test]
    fn test_interfaces_and_members_are_sorted() {
        let mut registry = CallRegistry::new();
        for (iface, member) in [
            ("com.gkeys.Profiles", "Activate"),
            ("com.gkeys.Macros", "SetMacro"),
            ("com.gkeys.Macros", "GetMacro"),
        ] {
            registry
                .register(Handler::method(addr(iface, member), vec![], vec![], |_, _| Ok(())))
                .unwrap();
        }

        let doc = build_document(&registry, PATH);

        let macros_pos = doc.find("com.gkeys.Macros").unwrap();
        let profiles_pos = doc.find("com.gkeys.Profiles").unwrap();
        assert!(macros_pos < profiles_pos);
        let get_pos = doc.find("GetMacro").unwrap();
        let set_pos = doc.find("SetMacro").unwrap();
        assert!(get_pos < set_pos);
    }
}
