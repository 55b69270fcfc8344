//! Metatype: parses `<MetaData>` descriptors — attribute schemas
//! (`<OCD>`/`<AD>`) and the `<Designate>` elements binding them to PIDs —
//! out of plugin-carried XML, using `roxmltree` the way the rest of the
//! workspace reaches for it for XML document shapes.

use std::collections::HashMap;

use roxmltree::{Document, Node};

use crate::error::{ConfigAdminError, ConfigAdminResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Integer,
    Long,
    Double,
    Char,
    Boolean,
    Password,
}

impl AttributeType {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "String" => Some(Self::String),
            "Integer" => Some(Self::Integer),
            "Long" => Some(Self::Long),
            "Double" => Some(Self::Double),
            "Char" => Some(Self::Char),
            "Boolean" => Some(Self::Boolean),
            "Password" => Some(Self::Password),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttributeOption {
    pub label: String,
    pub value: String,
}

/// One `<AD>` (attribute definition).
#[derive(Debug, Clone)]
pub struct AttributeDefinition {
    pub id: String,
    pub attr_type: AttributeType,
    pub cardinality: i32,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Comma-separated in the source XML (`\,` escapes a literal comma);
    /// required whenever `cardinality == 0`.
    pub default_value: Option<Vec<String>>,
    pub options: Vec<AttributeOption>,
    /// For `String`/`Password`, a value-length bound; for the numeric
    /// types, a bound on the parsed value itself. Unbounded when absent.
    pub min: Option<String>,
    pub max: Option<String>,
    /// Defaults to `true` per the original metatype schema — an `<AD>` is
    /// required unless explicitly marked otherwise.
    pub required: bool,
}

impl AttributeDefinition {
    /// Checks `value` against this attribute's type and `min`/`max` bound,
    /// the way option values are screened before being kept. Returns the
    /// reason the value is rejected, if any.
    pub fn validate_range(&self, value: &str) -> Result<(), String> {
        match self.attr_type {
            AttributeType::String | AttributeType::Password => {
                let len = value.chars().count() as i64;
                self.check_bounds(len, value, "length")
            }
            AttributeType::Integer => match value.parse::<i32>() {
                Ok(v) => self.check_bounds(v as i64, value, "value"),
                Err(_) => Err(format!("'{value}' is not a valid Integer")),
            },
            AttributeType::Long => match value.parse::<i64>() {
                Ok(v) => self.check_bounds(v, value, "value"),
                Err(_) => Err(format!("'{value}' is not a valid Long")),
            },
            AttributeType::Double => match value.parse::<f64>() {
                Ok(v) => {
                    if let Some(min) = self.min.as_deref().and_then(|m| m.parse::<f64>().ok()) {
                        if v < min {
                            return Err(format!("'{value}' is below the minimum {min}"));
                        }
                    }
                    if let Some(max) = self.max.as_deref().and_then(|m| m.parse::<f64>().ok()) {
                        if v > max {
                            return Err(format!("'{value}' is above the maximum {max}"));
                        }
                    }
                    Ok(())
                }
                Err(_) => Err(format!("'{value}' is not a valid Double")),
            },
            AttributeType::Char => match value.chars().next() {
                Some(c) if value.chars().count() == 1 => self.check_bounds(c as i64, value, "character"),
                _ => Err(format!("'{value}' is not a single Char")),
            },
            AttributeType::Boolean => match value.parse::<bool>() {
                Ok(_) => Ok(()),
                Err(_) => Err(format!("'{value}' is not a valid Boolean")),
            },
        }
    }

    fn check_bounds(&self, actual: i64, value: &str, noun: &str) -> Result<(), String> {
        if let Some(min) = self.min.as_deref().and_then(|m| m.parse::<i64>().ok()) {
            if actual < min {
                return Err(format!("'{value}' {noun} is below the minimum {min}"));
            }
        }
        if let Some(max) = self.max.as_deref().and_then(|m| m.parse::<i64>().ok()) {
            if actual > max {
                return Err(format!("'{value}' {noun} is above the maximum {max}"));
            }
        }
        Ok(())
    }
}

/// One `<OCD>` (object class definition): a named, described attribute
/// schema referenced by `id` from a `<Designate>`.
#[derive(Debug, Clone)]
pub struct ObjectClassDefinition {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub attributes: Vec<AttributeDefinition>,
}

/// One `<Designate>`: binds an OCD to a PID (or factory PID).
#[derive(Debug, Clone)]
pub struct Designate {
    pub pid: String,
    pub factory: bool,
    pub ocd_ref: String,
}

#[derive(Debug, Clone, Default)]
pub struct MetaData {
    pub ocds: HashMap<String, ObjectClassDefinition>,
    /// Keyed by PID; a later `<Designate>` for the same PID overwrites an
    /// earlier one within the same document.
    pub designates: HashMap<String, Designate>,
    locale: HashMap<String, String>,
}

impl MetaData {
    /// Supplies the message bundle `%key` references resolve against —
    /// the `.properties` file the declared localization base path points
    /// at, loaded by the caller's own resource loader. Replaces any bundle
    /// set previously.
    pub fn with_locale(mut self, bundle: HashMap<String, String>) -> Self {
        self.locale = bundle;
        self
    }

    /// Merges `bundle` into the current message bundle in place, as when a
    /// caller loads a base bundle and then a locale-specific override file.
    pub fn set_locale(&mut self, bundle: HashMap<String, String>) {
        self.locale.extend(bundle);
    }

    /// Resolves `%key`-style localized references against this document's
    /// message bundle; returns the raw value (including the leading `%`)
    /// when no bundle entry exists.
    pub fn localize<'a>(&'a self, raw: &'a str) -> &'a str {
        match raw.strip_prefix('%') {
            Some(key) => self.locale.get(key).map(String::as_str).unwrap_or(raw),
            None => raw,
        }
    }
}

fn text_attr(node: &Node, name: &str) -> Option<String> {
    node.attribute(name).map(str::to_string)
}

fn parse_options(node: &Node, attr: &AttributeDefinition) -> Vec<AttributeOption> {
    let mut options = Vec::new();
    for option in node.children().filter(|n| n.has_tag_name("Option")) {
        match (text_attr(&option, "label"), text_attr(&option, "value")) {
            (Some(label), Some(value)) => match attr.validate_range(&value) {
                Ok(()) => options.push(AttributeOption { label, value }),
                Err(reason) => tracing::warn!(attribute = %attr.id, %value, %reason, "dropping <Option> with invalid value"),
            },
            _ => tracing::warn!(attribute = %attr.id, "dropping <Option> missing label or value"),
        }
    }
    options
}

fn parse_default(raw: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                current.push(next);
                chars.next();
                continue;
            }
        }
        if c == ',' {
            values.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    values.push(current);
    values
}

fn parse_attribute(node: &Node, file: &str) -> ConfigAdminResult<AttributeDefinition> {
    let id = text_attr(node, "id").ok_or_else(|| ConfigAdminError::metatype_parse(file, "<AD> missing id"))?;
    let raw_type = text_attr(node, "type").ok_or_else(|| ConfigAdminError::metatype_parse(file, format!("<AD id={id}> missing type")))?;
    let attr_type = AttributeType::parse(&raw_type)
        .ok_or_else(|| ConfigAdminError::metatype_parse(file, format!("<AD id={id}> has unknown type {raw_type}")))?;
    let cardinality = text_attr(node, "cardinality")
        .map(|c| c.parse::<i32>())
        .transpose()
        .map_err(|_| ConfigAdminError::metatype_parse(file, format!("<AD id={id}> has non-numeric cardinality")))?
        .unwrap_or(0);

    let default_value = match text_attr(node, "default") {
        Some(raw) => Some(parse_default(&raw)),
        None if cardinality == 0 => {
            return Err(ConfigAdminError::metatype_parse(
                file,
                format!("<AD id={id}> has cardinality 0 and no default"),
            ))
        }
        None => None,
    };
    let required = text_attr(node, "required").map(|r| r == "true").unwrap_or(true);

    let mut attribute = AttributeDefinition {
        id,
        attr_type,
        cardinality,
        name: text_attr(node, "name"),
        description: text_attr(node, "description"),
        default_value,
        options: Vec::new(),
        min: text_attr(node, "min"),
        max: text_attr(node, "max"),
        required,
    };
    attribute.options = parse_options(node, &attribute);
    Ok(attribute)
}

fn parse_ocd(node: &Node, file: &str) -> ConfigAdminResult<ObjectClassDefinition> {
    let id = text_attr(node, "id").ok_or_else(|| ConfigAdminError::metatype_parse(file, "<OCD> missing id"))?;
    let name = text_attr(node, "name").ok_or_else(|| ConfigAdminError::metatype_parse(file, format!("<OCD id={id}> missing name")))?;
    let mut attributes = Vec::new();
    for ad in node.children().filter(|n| n.has_tag_name("AD")) {
        attributes.push(parse_attribute(&ad, file)?);
    }
    Ok(ObjectClassDefinition {
        id,
        name,
        description: text_attr(node, "description"),
        attributes,
    })
}

fn parse_designate(node: &Node, file: &str) -> ConfigAdminResult<Designate> {
    let pid = text_attr(node, "pid").ok_or_else(|| ConfigAdminError::metatype_parse(file, "<Designate> missing pid"))?;
    let factory = node.attribute("factoryPid").is_some();
    let object = node
        .children()
        .find(|n| n.has_tag_name("Object"))
        .ok_or_else(|| ConfigAdminError::metatype_parse(file, format!("<Designate pid={pid}> missing <Object>")))?;
    let ocd_ref = text_attr(&object, "ocdref").ok_or_else(|| ConfigAdminError::metatype_parse(file, format!("<Designate pid={pid}> <Object> missing ocdref")))?;
    Ok(Designate { pid, factory, ocd_ref })
}

/// Resource-bundle loading (`.properties` files under the localization
/// base path) is left to the caller, who has the plugin's resource
/// loader; this only records the declared base path's presence. Parsing
/// starts with an empty bundle, so every `%key` resolves to its raw form
/// until the caller supplies one via [`MetaData::with_locale`] or
/// [`MetaData::set_locale`].
fn parse_locale(_doc: &Document, _file: &str) -> ConfigAdminResult<HashMap<String, String>> {
    Ok(HashMap::new())
}

/// Parses one metatype XML document. A structurally invalid `<OCD>`/`<AD>`/
/// `<Designate>` aborts parsing of the whole file with
/// [`ConfigAdminError::MetatypeParse`]; other files a caller parses
/// separately are unaffected.
pub fn parse(xml: &str, file: &str) -> ConfigAdminResult<MetaData> {
    let doc = Document::parse(xml).map_err(|e| ConfigAdminError::metatype_parse(file, e.to_string()))?;
    let root = doc
        .root()
        .children()
        .find(|n| n.has_tag_name("MetaData"))
        .ok_or_else(|| ConfigAdminError::metatype_parse(file, "missing <MetaData> root"))?;

    let mut metadata = MetaData {
        locale: parse_locale(&doc, file)?,
        ..Default::default()
    };

    for ocd in root.children().filter(|n| n.has_tag_name("OCD")) {
        let parsed = parse_ocd(&ocd, file)?;
        metadata.ocds.insert(parsed.id.clone(), parsed);
    }
    for designate in root.children().filter(|n| n.has_tag_name("Designate")) {
        let parsed = parse_designate(&designate, file)?;
        metadata.designates.insert(parsed.pid.clone(), parsed);
    }

    Ok(metadata)
}
