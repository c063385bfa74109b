//! Depth-first textual dump of a parsed MXF object graph (spec §4.6
//! "Reference resolution": "A `dump(obj=Preface)` walks the graph
//! depth-first; unresolved references emit a marker, not an error").

use super::objects::MxfValue;
use super::MxfFile;

/// Dumps the object graph rooted at `start` (or the file's `Preface` if
/// `None`) as an indented tree. Mirrors `MXFFile.dump()`: a scalar
/// reference recurses silently, an array reference prints its field name
/// first, and a reference with no matching instance prints `None` rather
/// than erroring.
pub fn dump(file: &MxfFile, start: Option<aaf_core::ids::Auid>) -> String {
    let mut out = String::new();
    if let Some(root) = start.or(file.preface) {
        dump_object(file, root, "", &mut out);
    }
    out
}

fn dump_object(file: &MxfFile, id: aaf_core::ids::Auid, indent: &str, out: &mut String) {
    match file.objects.get(&id) {
        Some(obj) => {
            out.push_str(&format!("{indent} {} {}\n", obj.class_name, id));
            let next_indent = format!("{indent} ");
            let mut keys: Vec<_> = obj.fields.keys().collect();
            keys.sort();
            for key in keys {
                match &obj.fields[key] {
                    MxfValue::Ref(target) => dump_object(file, *target, &next_indent, out),
                    MxfValue::RefArray(targets) => {
                        out.push_str(&format!("{next_indent} {key}\n"));
                        for target in targets {
                            dump_object(file, *target, &format!("{next_indent} "), out);
                        }
                    }
                    other => out.push_str(&format!("{next_indent} {key} {other:?}\n")),
                }
            }
        }
        None => out.push_str(&format!("{indent} None\n")),
    }
}

/// Flat dump: every decoded object, unindented, in the `MXFFile.dump_flat()`
/// style (no graph walk, no reference resolution).
pub fn dump_flat(file: &MxfFile) -> String {
    let mut out = String::new();
    for (id, obj) in &file.objects {
        out.push_str(&format!("{} {}\n", obj.class_name, id));
        let mut keys: Vec<_> = obj.fields.keys().collect();
        keys.sort();
        for key in keys {
            out.push_str(&format!("  {key} {:?}\n", obj.fields[key]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mxf::objects::{MxfObject, ObjectKind};
    use aaf_core::ids::Auid;
    use std::collections::HashMap;

    fn make_object(class_name: &'static str, id: Auid) -> MxfObject {
        MxfObject { class_name, instance_id: Some(id), fields: HashMap::new() }
    }

    #[test]
    fn unresolved_reference_prints_none_marker() {
        let preface_id = Auid::from_be_bytes([1; 16]);
        let content_storage_id = Auid::from_be_bytes([2; 16]);

        let mut preface = make_object("Preface", preface_id);
        preface.fields.insert("ContentStorage", MxfValue::Ref(content_storage_id));

        let mut objects = HashMap::new();
        objects.insert(preface_id, preface);

        let file = MxfFile {
            objects,
            local_tags: HashMap::new(),
            preface: Some(preface_id),
            header_operation_pattern: None,
        };

        let text = dump(&file, None);
        assert!(text.contains("Preface"));
        assert!(text.contains("None"));
    }

    #[test]
    fn class_table_kind_matches_preface() {
        assert_eq!(
            crate::mxf::objects::CLASS_TABLE
                .get(&Auid::parse_canonical("060e2b34-0253-0101-0d01-010101012f00").unwrap())
                .map(|(_, k)| *k),
            Some(ObjectKind::Preface)
        );
    }
}
