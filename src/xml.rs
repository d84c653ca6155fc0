//! Model → XML serializer.
//!
//! Objects become nested elements, arrays repeat their element name once
//! per item, scalars become text and `null` an empty element. An `@` object
//! inside an object is written as that element's attributes.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::Value;

use crate::runtime::to_text;
use crate::ViewError;

pub const DEFAULT_ROOT: &str = "root";

const ATTRIBUTES_KEY: &str = "@";

/// Serialize `model` under `root_name` (default `root`). A top-level array
/// is written as `<item>` children of the root.
pub fn to_xml(model: &Value, root_name: Option<&str>) -> Result<String, ViewError> {
    let root = root_name.filter(|n| !n.is_empty()).unwrap_or(DEFAULT_ROOT);
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_error)?;

    match model {
        Value::Array(items) => {
            check_name(root)?;
            writer
                .write_event(Event::Start(BytesStart::new(root)))
                .map_err(xml_error)?;
            for item in items {
                element(&mut writer, "item", item)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(root)))
                .map_err(xml_error)?;
        }
        other => element(&mut writer, root, other)?,
    }

    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

fn element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> Result<(), ViewError> {
    check_name(name)?;
    match value {
        Value::Array(items) => {
            for item in items {
                element(writer, name, item)?;
            }
        }
        Value::Null => {
            writer
                .write_event(Event::Empty(BytesStart::new(name)))
                .map_err(xml_error)?;
        }
        Value::Object(map) => {
            let mut start = BytesStart::new(name);
            if let Some(Value::Object(attributes)) = map.get(ATTRIBUTES_KEY) {
                for (key, value) in attributes {
                    check_name(key)?;
                    start.push_attribute((key.as_str(), to_text(value).as_str()));
                }
            }
            writer.write_event(Event::Start(start)).map_err(xml_error)?;
            for (key, child) in map {
                if key != ATTRIBUTES_KEY {
                    element(writer, key, child)?;
                }
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(xml_error)?;
        }
        scalar => {
            let text = to_text(scalar);
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(xml_error)?;
            writer
                .write_event(Event::Text(BytesText::new(&text)))
                .map_err(xml_error)?;
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(xml_error)?;
        }
    }
    Ok(())
}

fn check_name(name: &str) -> Result<(), ViewError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == ':');
    let valid_rest = chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(ViewError::Xml(format!("invalid element name {:?}", name)))
    }
}

fn xml_error(err: impl std::fmt::Display) -> ViewError {
    ViewError::Xml(err.to_string())
}
