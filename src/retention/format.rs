use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use log::warn;

use crate::screen::screen_model::{ActionKind, ElementProperties, Rect};
use crate::state::identity::ConcreteId;
use crate::state::state_model::Element;
use crate::trace::trace::Interaction;

// ============================================================================
// Escaping
// ============================================================================

pub fn escape(value: &str, sep: char) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if c == sep => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Split one persisted line into unescaped fields.
pub fn split_row(line: &str, sep: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some(other) => current.push(other),
                None => current.push('\\'),
            },
            c if c == sep => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

pub fn join_row(values: &[String], sep: char) -> String {
    values
        .iter()
        .map(|v| escape(v, sep))
        .collect::<Vec<_>>()
        .join(&sep.to_string())
}

// ============================================================================
// Value encodings
// ============================================================================

pub fn flag_to_string(flag: Option<bool>) -> String {
    flag.map(|b| b.to_string())
        .unwrap_or_else(|| "disabled".to_string())
}

pub fn parse_flag(s: &str) -> Result<Option<bool>, String> {
    match s.trim() {
        "disabled" | "null" => Ok(None),
        other => parse_bool(other).map(Some),
    }
}

pub fn parse_bool(s: &str) -> Result<bool, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("'{}' is not a boolean", s))
}

pub fn rect_to_string(r: &Rect) -> String {
    format!("{}:{}:{}:{}", r.x, r.y, r.width, r.height)
}

pub fn parse_rect(s: &str) -> Result<Rect, String> {
    let parts = s
        .trim()
        .split(':')
        .map(|p| p.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("bad rectangle '{}': {}", s, e))?;
    match parts.as_slice() {
        [x, y, w, h] => Ok(Rect::new(*x, *y, *w, *h)),
        _ => Err(format!("bad rectangle '{}'", s)),
    }
}

fn list_to_string<T>(items: &[T], f: impl Fn(&T) -> String) -> String {
    format!("[{}]", items.iter().map(f).collect::<Vec<_>>().join(","))
}

fn list_items(s: &str) -> Result<Vec<&str>, String> {
    let inner = s
        .trim()
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .ok_or_else(|| format!("'{}' is not a list", s))?;
    Ok(inner
        .split(',')
        .map(str::trim)
        .filter(|i| !i.is_empty())
        .collect())
}

pub fn parse_int_list(s: &str) -> Result<Vec<i32>, String> {
    list_items(s)?
        .into_iter()
        .map(|i| i.parse().map_err(|e| format!("bad integer '{}': {}", i, e)))
        .collect()
}

pub fn parse_rect_list(s: &str) -> Result<Vec<Rect>, String> {
    list_items(s)?.into_iter().map(parse_rect).collect()
}

pub fn timestamp_to_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{}': {}", s, e))
}

// ============================================================================
// Header handling
// ============================================================================

/// A column of a persisted file, identified by its header name.
pub trait Column: Copy + Eq + std::hash::Hash + 'static {
    const ALL: &'static [Self];

    fn header(&self) -> &'static str;

    fn header_row(sep: char) -> String {
        join_row(
            &Self::ALL
                .iter()
                .map(|c| c.header().to_string())
                .collect::<Vec<_>>(),
            sep,
        )
    }
}

/// Map each known column to its position in a persisted header. Renamed
/// headers are translated first; unknown headers are ignored.
pub fn column_indices<C: Column>(
    header: &[String],
    renames: &HashMap<String, String>,
) -> HashMap<C, usize> {
    let mut indices = HashMap::new();

    for (i, name) in header.iter().enumerate() {
        let name = name.trim();
        let name = renames.get(name).map(String::as_str).unwrap_or(name);
        match C::ALL.iter().find(|c| c.header() == name) {
            Some(c) => {
                indices.insert(*c, i);
            }
            None => warn!("ignoring unknown column '{}'", name),
        }
    }

    let missing: Vec<&str> = C::ALL
        .iter()
        .filter(|c| !indices.contains_key(*c))
        .map(|c| c.header())
        .collect();
    if !missing.is_empty() {
        warn!("persisted header lacks {:?}, defaults will be used", missing);
    }

    indices
}

/// Values of one row looked up by column.
pub struct Row<'a, C: Column> {
    values: &'a [String],
    indices: &'a HashMap<C, usize>,
}

impl<'a, C: Column> Row<'a, C> {
    pub fn new(values: &'a [String], indices: &'a HashMap<C, usize>) -> Self {
        Self { values, indices }
    }

    pub fn get(&self, column: C) -> Option<&'a str> {
        self.indices
            .get(&column)
            .and_then(|i| self.values.get(*i))
            .map(String::as_str)
    }

    pub fn required(&self, column: C) -> Result<&'a str, String> {
        self.get(column)
            .ok_or_else(|| format!("missing value for '{}'", column.header()))
    }

    pub fn text(&self, column: C) -> String {
        self.get(column).unwrap_or_default().to_string()
    }

    pub fn parse_or<T>(
        &self,
        column: C,
        default: T,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Result<T, String> {
        match self.get(column) {
            Some(v) => parse(v).map_err(|e| format!("{}: {}", column.header(), e)),
            None => Ok(default),
        }
    }
}

// ============================================================================
// Element rows
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementColumn {
    Uid,
    ConfigId,
    ParentId,
    HashId,
    ChildHashes,
    ClassName,
    PackageName,
    Text,
    HintText,
    Description,
    ResourceId,
    Interactive,
    Enabled,
    Visible,
    Clickable,
    LongClickable,
    Scrollable,
    Checked,
    Focused,
    Selected,
    InputField,
    Password,
    Keyboard,
    Bounds,
    VisibleAreas,
    XPath,
}

impl Column for ElementColumn {
    const ALL: &'static [ElementColumn] = &[
        ElementColumn::Uid,
        ElementColumn::ConfigId,
        ElementColumn::ParentId,
        ElementColumn::HashId,
        ElementColumn::ChildHashes,
        ElementColumn::ClassName,
        ElementColumn::PackageName,
        ElementColumn::Text,
        ElementColumn::HintText,
        ElementColumn::Description,
        ElementColumn::ResourceId,
        ElementColumn::Interactive,
        ElementColumn::Enabled,
        ElementColumn::Visible,
        ElementColumn::Clickable,
        ElementColumn::LongClickable,
        ElementColumn::Scrollable,
        ElementColumn::Checked,
        ElementColumn::Focused,
        ElementColumn::Selected,
        ElementColumn::InputField,
        ElementColumn::Password,
        ElementColumn::Keyboard,
        ElementColumn::Bounds,
        ElementColumn::VisibleAreas,
        ElementColumn::XPath,
    ];

    fn header(&self) -> &'static str {
        match self {
            ElementColumn::Uid => "UID",
            ElementColumn::ConfigId => "Config ID",
            ElementColumn::ParentId => "Parent ID",
            ElementColumn::HashId => "Hash ID",
            ElementColumn::ChildHashes => "Child Hashes",
            ElementColumn::ClassName => "Class Name",
            ElementColumn::PackageName => "Package Name",
            ElementColumn::Text => "Text",
            ElementColumn::HintText => "Hint Text",
            ElementColumn::Description => "Description",
            ElementColumn::ResourceId => "Resource ID",
            ElementColumn::Interactive => "Interactive",
            ElementColumn::Enabled => "Enabled",
            ElementColumn::Visible => "Visible",
            ElementColumn::Clickable => "Clickable",
            ElementColumn::LongClickable => "Long Clickable",
            ElementColumn::Scrollable => "Scrollable",
            ElementColumn::Checked => "Checked",
            ElementColumn::Focused => "Focused",
            ElementColumn::Selected => "Selected",
            ElementColumn::InputField => "Input Field",
            ElementColumn::Password => "Password",
            ElementColumn::Keyboard => "Keyboard",
            ElementColumn::Bounds => "Bounds",
            ElementColumn::VisibleAreas => "Visible Areas",
            ElementColumn::XPath => "XPath",
        }
    }
}

pub fn element_row(e: &Element, sep: char) -> String {
    let p = &e.properties;
    let values: Vec<String> = ElementColumn::ALL
        .iter()
        .map(|c| match c {
            ElementColumn::Uid => e.uid.to_string(),
            ElementColumn::ConfigId => e.config_id.to_string(),
            ElementColumn::ParentId => ConcreteId::optional_string(e.parent_id.as_ref()),
            ElementColumn::HashId => p.element_hash.to_string(),
            ElementColumn::ChildHashes => list_to_string(&p.child_hashes, ToString::to_string),
            ElementColumn::ClassName => p.class_name.clone(),
            ElementColumn::PackageName => p.package_name.clone(),
            ElementColumn::Text => p.text.clone(),
            ElementColumn::HintText => p.hint_text.clone(),
            ElementColumn::Description => p.content_desc.clone(),
            ElementColumn::ResourceId => p.resource_id.clone(),
            ElementColumn::Interactive => e.is_interactive().to_string(),
            ElementColumn::Enabled => p.enabled.to_string(),
            ElementColumn::Visible => p.visible.to_string(),
            ElementColumn::Clickable => p.clickable.to_string(),
            ElementColumn::LongClickable => p.long_clickable.to_string(),
            ElementColumn::Scrollable => p.scrollable.to_string(),
            ElementColumn::Checked => flag_to_string(p.checked),
            ElementColumn::Focused => flag_to_string(p.focused),
            ElementColumn::Selected => p.selected.to_string(),
            ElementColumn::InputField => p.is_input_field.to_string(),
            ElementColumn::Password => p.is_password.to_string(),
            ElementColumn::Keyboard => p.is_keyboard.to_string(),
            ElementColumn::Bounds => rect_to_string(&p.bounds),
            ElementColumn::VisibleAreas => list_to_string(&p.visible_areas, rect_to_string),
            ElementColumn::XPath => p.xpath.clone(),
        })
        .collect();
    join_row(&values, sep)
}

/// An element row as it was persisted. `properties.parent_hash` is not
/// persisted; the loader restores it from `parent_id`.
#[derive(Debug, Clone)]
pub struct PersistedElement {
    pub id: ConcreteId,
    pub parent_id: Option<ConcreteId>,
    pub properties: ElementProperties,
}

pub fn parse_element_row(row: &Row<'_, ElementColumn>) -> Result<PersistedElement, String> {
    use ElementColumn as C;

    let uid = row.required(C::Uid)?;
    let config_id = row.required(C::ConfigId)?;
    let id = ConcreteId::new(
        uid.parse().map_err(|e| format!("bad uid '{}': {}", uid, e))?,
        config_id
            .parse()
            .map_err(|e| format!("bad config id '{}': {}", config_id, e))?,
    );
    let parent_id = row.parse_or(C::ParentId, None, ConcreteId::parse_optional)?;
    let element_hash = row
        .required(C::HashId)?
        .trim()
        .parse()
        .map_err(|e| format!("bad hash id: {}", e))?;

    let properties = ElementProperties {
        text: row.text(C::Text),
        hint_text: row.text(C::HintText),
        content_desc: row.text(C::Description),
        resource_id: row.text(C::ResourceId),
        class_name: row.text(C::ClassName),
        package_name: row.text(C::PackageName),
        enabled: row.parse_or(C::Enabled, true, parse_bool)?,
        visible: row.parse_or(C::Visible, true, parse_bool)?,
        clickable: row.parse_or(C::Clickable, false, parse_bool)?,
        long_clickable: row.parse_or(C::LongClickable, false, parse_bool)?,
        scrollable: row.parse_or(C::Scrollable, false, parse_bool)?,
        checked: row.parse_or(C::Checked, None, parse_flag)?,
        focused: row.parse_or(C::Focused, None, parse_flag)?,
        selected: row.parse_or(C::Selected, false, parse_bool)?,
        is_input_field: row.parse_or(C::InputField, false, parse_bool)?,
        is_password: row.parse_or(C::Password, false, parse_bool)?,
        is_keyboard: row.parse_or(C::Keyboard, false, parse_bool)?,
        bounds: row.parse_or(C::Bounds, Rect::default(), parse_rect)?,
        visible_areas: row.parse_or(C::VisibleAreas, Vec::new(), parse_rect_list)?,
        xpath: row.text(C::XPath),
        element_hash,
        parent_hash: 0,
        child_hashes: row.parse_or(C::ChildHashes, Vec::new(), parse_int_list)?,
    };

    Ok(PersistedElement {
        id,
        parent_id,
        properties,
    })
}

// ============================================================================
// Interaction rows
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceColumn {
    SourceState,
    Action,
    Target,
    ResultState,
    StartTime,
    EndTime,
    Successful,
    Exception,
    Data,
}

impl Column for TraceColumn {
    const ALL: &'static [TraceColumn] = &[
        TraceColumn::SourceState,
        TraceColumn::Action,
        TraceColumn::Target,
        TraceColumn::ResultState,
        TraceColumn::StartTime,
        TraceColumn::EndTime,
        TraceColumn::Successful,
        TraceColumn::Exception,
        TraceColumn::Data,
    ];

    fn header(&self) -> &'static str {
        match self {
            TraceColumn::SourceState => "Source State",
            TraceColumn::Action => "Action",
            TraceColumn::Target => "Interacted Element",
            TraceColumn::ResultState => "Resulting State",
            TraceColumn::StartTime => "Start Time",
            TraceColumn::EndTime => "End Time",
            TraceColumn::Successful => "Successful",
            TraceColumn::Exception => "Exception",
            TraceColumn::Data => "Data",
        }
    }
}

pub fn interaction_row(i: &Interaction, sep: char) -> String {
    let values: Vec<String> = TraceColumn::ALL
        .iter()
        .map(|c| match c {
            TraceColumn::SourceState => i.prev_state.to_string(),
            TraceColumn::Action => i.action_kind.name().to_string(),
            TraceColumn::Target => ConcreteId::optional_string(i.target_id().as_ref()),
            TraceColumn::ResultState => i.res_state.to_string(),
            TraceColumn::StartTime => timestamp_to_string(&i.start_timestamp),
            TraceColumn::EndTime => timestamp_to_string(&i.end_timestamp),
            TraceColumn::Successful => i.successful.to_string(),
            TraceColumn::Exception => i.exception.clone(),
            TraceColumn::Data => i.data.clone(),
        })
        .collect();
    join_row(&values, sep)
}

/// An interaction row as persisted; ids are the recorded (possibly outdated) ones.
#[derive(Debug, Clone)]
pub struct PersistedInteraction {
    pub prev_state: ConcreteId,
    pub action_kind: ActionKind,
    pub target: Option<ConcreteId>,
    pub res_state: ConcreteId,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    pub successful: bool,
    pub exception: String,
    pub data: String,
}

pub fn parse_interaction_row(row: &Row<'_, TraceColumn>) -> Result<PersistedInteraction, String> {
    use TraceColumn as C;

    let action = row.required(C::Action)?.trim();
    Ok(PersistedInteraction {
        prev_state: row.required(C::SourceState)?.parse()?,
        action_kind: ActionKind::from_name(action)
            .ok_or_else(|| format!("unknown action '{}'", action))?,
        target: row.parse_or(C::Target, None, ConcreteId::parse_optional)?,
        res_state: row.required(C::ResultState)?.parse()?,
        start_timestamp: parse_timestamp(row.required(C::StartTime)?)?,
        end_timestamp: parse_timestamp(row.required(C::EndTime)?)?,
        successful: row.parse_or(C::Successful, true, parse_bool)?,
        exception: row.text(C::Exception),
        data: row.text(C::Data),
    })
}
