//! Block builder
//!
//! Converts declarative YAML block definitions into the API's block JSON.
//! Every definition is first normalized (legacy shorthand such as
//! `type: H2, heading: ...`), then decoded into the closed [`Block`] enum and
//! finally rendered. Decoding never fails: malformed or unknown input becomes
//! [`Block::Unsupported`], rendered as a paragraph carrying a bracketed
//! diagnostic, so a page always gets some content.
//!
//! Rendered blocks have exactly one top-level key, the block type:
//!
//! ```text
//! {type: H2, heading: Summary}
//!   -> {"heading_2": {"rich_text": [{"text": {"content": "Summary"}}]}}
//! ```

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::text::{is_http_url, rich_text, scalar_text};

/// Default longest rich-text segment
pub const DEFAULT_MAX_TEXT_CHARS: usize = 2000;

/// Nesting levels one request may carry below its top-level blocks
pub const MAX_NESTING_DEPTH: usize = 2;

/// Languages accepted by code blocks; anything else renders as "plain text".
const CODE_LANGUAGES: &[&str] = &[
    "bash", "c", "c#", "c++", "css", "diff", "docker", "go", "graphql", "html", "java",
    "javascript", "json", "kotlin", "latex", "makefile", "markdown", "mermaid", "php",
    "plain text", "powershell", "python", "ruby", "rust", "scala", "shell", "sql", "swift",
    "toml", "typescript", "xml", "yaml",
];

/// Colors accepted by text-bearing blocks.
const BLOCK_COLORS: &[&str] = &[
    "default", "gray", "brown", "orange", "yellow", "green", "blue", "purple", "pink", "red",
    "gray_background", "brown_background", "orange_background", "yellow_background",
    "green_background", "blue_background", "purple_background", "pink_background",
    "red_background",
];

/// External-file style blocks that require a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    File,
    Pdf,
    Video,
    Bookmark,
    Embed,
}

impl MediaKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::File => "file",
            MediaKind::Pdf => "pdf",
            MediaKind::Video => "video",
            MediaKind::Bookmark => "bookmark",
            MediaKind::Embed => "embed",
        }
    }
}

/// Target of a `link_to_page` block
#[derive(Debug, Clone, PartialEq)]
pub enum LinkTarget {
    PageId(String),
    DatabaseId(String),
    /// Title of a page created in this run, resolved at render time
    PageTitle(String),
    /// Title of a database created in this run, resolved at render time
    DatabaseTitle(String),
}

/// A decoded block. One variant per block kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph { text: String, color: Option<String>, children: Vec<Block> },
    Heading { level: u8, text: String, color: Option<String>, toggleable: bool, children: Vec<Block> },
    BulletedListItem { text: String, children: Vec<Block> },
    NumberedListItem { text: String, children: Vec<Block> },
    Callout { text: String, icon: Option<String>, color: Option<String>, children: Vec<Block> },
    Quote { text: String, children: Vec<Block> },
    Toggle { text: String, children: Vec<Block> },
    Code { text: String, language: String },
    Divider,
    ToDo { text: String, checked: bool, children: Vec<Block> },
    Media { kind: MediaKind, url: String, caption: Option<String> },
    Table { rows: Vec<Vec<String>>, has_column_header: bool, has_row_header: bool },
    ChildPage { title: String },
    LinkToPage { target: LinkTarget },
    TableOfContents,
    Breadcrumb,
    ColumnList { columns: Vec<Vec<Block>> },
    /// Fallback for anything malformed or unknown
    Unsupported { diagnostic: String },
}

impl Block {
    /// Decode a single YAML block definition.
    pub fn from_value(def: &Value) -> Block {
        match def {
            Value::String(s) => Block::Paragraph {
                text: s.clone(),
                color: None,
                children: Vec::new(),
            },
            Value::Object(raw) => decode(&normalize_legacy(raw)),
            _ => Block::Unsupported {
                diagnostic: "[INVALID BLOCK: expected a mapping or text]".to_string(),
            },
        }
    }

    /// API type name; `paragraph` for the fallback.
    pub fn type_name(&self) -> &'static str {
        match self {
            Block::Paragraph { .. } | Block::Unsupported { .. } => "paragraph",
            Block::Heading { level: 1, .. } => "heading_1",
            Block::Heading { level: 2, .. } => "heading_2",
            Block::Heading { .. } => "heading_3",
            Block::BulletedListItem { .. } => "bulleted_list_item",
            Block::NumberedListItem { .. } => "numbered_list_item",
            Block::Callout { .. } => "callout",
            Block::Quote { .. } => "quote",
            Block::Toggle { .. } => "toggle",
            Block::Code { .. } => "code",
            Block::Divider => "divider",
            Block::ToDo { .. } => "to_do",
            Block::Media { kind, .. } => kind.type_name(),
            Block::Table { .. } => "table",
            Block::ChildPage { .. } => "child_page",
            Block::LinkToPage { .. } => "link_to_page",
            Block::TableOfContents => "table_of_contents",
            Block::Breadcrumb => "breadcrumb",
            Block::ColumnList { .. } => "column_list",
        }
    }

    /// Nested blocks rendered under this one.
    pub fn children(&self) -> &[Block] {
        match self {
            Block::Paragraph { children, .. }
            | Block::BulletedListItem { children, .. }
            | Block::NumberedListItem { children, .. }
            | Block::Callout { children, .. }
            | Block::Quote { children, .. }
            | Block::Toggle { children, .. }
            | Block::ToDo { children, .. } => children,
            Block::Heading { toggleable: true, children, .. } => children,
            _ => &[],
        }
    }
}

/// Canonicalize legacy type names and field names.
///
/// `type: H2, heading: X` becomes `type: heading_2, content: X`.
pub fn normalize_legacy(raw: &Map<String, Value>) -> Map<String, Value> {
    let mut map = raw.clone();

    if let Some(Value::String(t)) = raw.get("type") {
        map.insert("type".to_string(), Value::String(canonical_type(t)));
    }

    if !map.contains_key("content") {
        if let Some(heading) = map.remove("heading") {
            map.insert("content".to_string(), heading);
        }
    }

    map
}

fn canonical_type(raw: &str) -> String {
    let key = raw.trim().to_lowercase().replace(['-', ' '], "_");
    let canonical = match key.as_str() {
        "h1" | "heading1" | "header" => "heading_1",
        "h2" | "heading2" | "subheader" => "heading_2",
        "h3" | "heading3" | "subsubheader" => "heading_3",
        "p" | "text" => "paragraph",
        "bullet" | "bulleted" | "ul" | "li" => "bulleted_list_item",
        "numbered" | "ol" => "numbered_list_item",
        "todo" | "checkbox" => "to_do",
        "checklist" | "to_do_list" | "todo_list" => "to_do_list",
        "toc" => "table_of_contents",
        "hr" | "separator" => "divider",
        "columns" => "column_list",
        "link_to" | "page_link" => "link_to_page",
        "subpage" => "child_page",
        other => return other.to_string(),
    };
    canonical.to_string()
}

fn text_of(map: &Map<String, Value>) -> String {
    ["content", "text", "title"]
        .iter()
        .find_map(|k| map.get(*k).and_then(scalar_text))
        .unwrap_or_default()
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(scalar_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn children_of(map: &Map<String, Value>) -> Vec<Block> {
    match map.get("children") {
        Some(Value::Array(items)) => decode_list(items),
        _ => Vec::new(),
    }
}

fn color_of(map: &Map<String, Value>) -> Option<String> {
    string_field(map, "color").filter(|c| BLOCK_COLORS.contains(&c.as_str()))
}

fn decode(map: &Map<String, Value>) -> Block {
    let block_type = match map.get("type") {
        Some(Value::String(t)) => t.as_str(),
        Some(_) => {
            return Block::Unsupported {
                diagnostic: "[INVALID BLOCK: type must be text]".to_string(),
            }
        }
        None => {
            return Block::Unsupported {
                diagnostic: "[INVALID BLOCK: missing type]".to_string(),
            }
        }
    };

    let text = text_of(map);
    match block_type {
        "paragraph" => Block::Paragraph {
            text,
            color: color_of(map),
            children: children_of(map),
        },
        "heading_1" | "heading_2" | "heading_3" => Block::Heading {
            level: block_type.as_bytes()[8] - b'0',
            text,
            color: color_of(map),
            toggleable: map
                .get("toggleable")
                .or_else(|| map.get("is_toggleable"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            children: children_of(map),
        },
        "bulleted_list_item" => Block::BulletedListItem {
            text,
            children: children_of(map),
        },
        "numbered_list_item" => Block::NumberedListItem {
            text,
            children: children_of(map),
        },
        "callout" => Block::Callout {
            text,
            icon: string_field(map, "icon").or_else(|| string_field(map, "emoji")),
            color: color_of(map),
            children: children_of(map),
        },
        "quote" => Block::Quote {
            text,
            children: children_of(map),
        },
        "toggle" => Block::Toggle {
            text,
            children: children_of(map),
        },
        "code" => Block::Code {
            text: string_field(map, "code").unwrap_or(text),
            language: code_language(string_field(map, "language").as_deref()),
        },
        "divider" => Block::Divider,
        "to_do" => Block::ToDo {
            text,
            checked: map.get("checked").and_then(Value::as_bool).unwrap_or(false),
            children: children_of(map),
        },
        "image" => media(map, MediaKind::Image),
        "file" => media(map, MediaKind::File),
        "pdf" => media(map, MediaKind::Pdf),
        "video" => media(map, MediaKind::Video),
        "bookmark" => media(map, MediaKind::Bookmark),
        "embed" => media(map, MediaKind::Embed),
        "table" => table(map),
        "child_page" => match string_field(map, "title").or_else(|| Some(text).filter(|t| !t.is_empty())) {
            Some(title) => Block::ChildPage { title },
            None => Block::Unsupported {
                diagnostic: "[CHILD_PAGE: No title provided]".to_string(),
            },
        },
        "link_to_page" => link_to_page(map),
        "table_of_contents" => Block::TableOfContents,
        "breadcrumb" => Block::Breadcrumb,
        "column_list" => column_list(map),
        other => Block::Unsupported {
            diagnostic: format!("[UNSUPPORTED BLOCK: {}]", other),
        },
    }
}

fn code_language(raw: Option<&str>) -> String {
    let lang = raw.unwrap_or("plain text").trim().to_lowercase();
    let lang = match lang.as_str() {
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "rs" => "rust",
        "sh" | "zsh" => "shell",
        "yml" => "yaml",
        "md" => "markdown",
        "text" | "txt" | "plain" => "plain text",
        other => other,
    };
    if CODE_LANGUAGES.contains(&lang) {
        lang.to_string()
    } else {
        "plain text".to_string()
    }
}

fn media(map: &Map<String, Value>, kind: MediaKind) -> Block {
    let url = ["url", "src", "link"]
        .iter()
        .find_map(|k| string_field(map, k))
        .filter(|u| is_http_url(u));
    match url {
        Some(url) => Block::Media {
            kind,
            url,
            caption: string_field(map, "caption"),
        },
        None => Block::Unsupported {
            diagnostic: format!(
                "[{}: No valid URL provided]",
                kind.type_name().to_uppercase()
            ),
        },
    }
}

fn table(map: &Map<String, Value>) -> Block {
    let mut rows: Vec<Vec<String>> = Vec::new();

    // `headers` is an optional separate header row
    if let Some(Value::Array(headers)) = map.get("headers") {
        rows.push(headers.iter().map(|c| scalar_text(c).unwrap_or_default()).collect());
    }

    if let Some(Value::Array(raw_rows)) = map.get("rows") {
        for row in raw_rows {
            match row {
                Value::Array(cells) => {
                    rows.push(cells.iter().map(|c| scalar_text(c).unwrap_or_default()).collect())
                }
                other => rows.push(vec![scalar_text(other).unwrap_or_default()]),
            }
        }
    }

    if rows.is_empty() {
        return Block::Unsupported {
            diagnostic: "[TABLE: No rows provided]".to_string(),
        };
    }

    let width = rows.iter().map(Vec::len).max().unwrap_or(1).max(1);
    for row in &mut rows {
        row.resize(width, String::new());
    }

    Block::Table {
        rows,
        has_column_header: map
            .get("has_column_header")
            .and_then(Value::as_bool)
            .unwrap_or(true),
        has_row_header: map
            .get("has_row_header")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

fn link_to_page(map: &Map<String, Value>) -> Block {
    let target = if let Some(id) = string_field(map, "page_id") {
        Some(LinkTarget::PageId(id))
    } else if let Some(id) = string_field(map, "database_id") {
        Some(LinkTarget::DatabaseId(id))
    } else if let Some(title) = string_field(map, "page") {
        Some(LinkTarget::PageTitle(title))
    } else {
        string_field(map, "database").map(LinkTarget::DatabaseTitle)
    };

    match target {
        Some(target) => Block::LinkToPage { target },
        None => Block::Unsupported {
            diagnostic: "[LINK_TO_PAGE: No page provided]".to_string(),
        },
    }
}

fn column_list(map: &Map<String, Value>) -> Block {
    let columns: Vec<Vec<Block>> = match map.get("columns") {
        Some(Value::Array(cols)) => cols
            .iter()
            .map(|col| match col {
                Value::Array(blocks) => decode_list(blocks),
                Value::Object(inner) => children_of(inner),
                other => vec![Block::from_value(other)],
            })
            .filter(|col| !col.is_empty())
            .collect(),
        _ => Vec::new(),
    };

    if columns.len() < 2 {
        return Block::Unsupported {
            diagnostic: "[COLUMN_LIST: At least two columns required]".to_string(),
        };
    }
    Block::ColumnList { columns }
}

/// Decode a list of definitions, expanding `bulleted_list` / `numbered_list`
/// / `to_do_list` entries with `items` into one block per item.
pub fn decode_list(defs: &[Value]) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(defs.len());
    for def in defs {
        match expand_items(def) {
            Some(items) => blocks.extend(items),
            None => blocks.push(Block::from_value(def)),
        }
    }
    blocks
}

fn expand_items(def: &Value) -> Option<Vec<Block>> {
    let map = normalize_legacy(def.as_object()?);
    let items = map.get("items")?.as_array()?;
    let item_type = match map.get("type")?.as_str()? {
        "bulleted_list" | "bulleted_list_item" => "bulleted_list_item",
        "numbered_list" | "numbered_list_item" => "numbered_list_item",
        "to_do_list" | "to_do" => "to_do",
        _ => return None,
    };
    // A list item with its own content is a single item, not a list
    if map.contains_key("content") || map.contains_key("text") {
        return None;
    }

    Some(
        items
            .iter()
            .map(|item| {
                let mut item_map = match item {
                    Value::Object(m) => m.clone(),
                    other => {
                        let mut m = Map::new();
                        m.insert("content".to_string(), other.clone());
                        m
                    }
                };
                item_map.insert("type".to_string(), Value::String(item_type.to_string()));
                decode(&item_map)
            })
            .collect(),
    )
}

/// Renders decoded blocks, resolving `link_to_page` titles against
/// pages and databases created so far.
pub struct BlockBuilder<'a> {
    max_text_chars: usize,
    pages: Option<&'a BTreeMap<String, String>>,
    databases: Option<&'a BTreeMap<String, String>>,
}

impl Default for BlockBuilder<'_> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TEXT_CHARS)
    }
}

impl<'a> BlockBuilder<'a> {
    pub fn new(max_text_chars: usize) -> Self {
        Self {
            max_text_chars,
            pages: None,
            databases: None,
        }
    }

    pub fn with_pages(mut self, pages: &'a BTreeMap<String, String>) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn with_databases(mut self, databases: &'a BTreeMap<String, String>) -> Self {
        self.databases = Some(databases);
        self
    }

    /// Build one definition.
    pub fn build(&self, def: &Value) -> Value {
        self.render(&Block::from_value(def))
    }

    /// Build a list of definitions, expanding list shorthands.
    pub fn build_all(&self, defs: &[Value]) -> Vec<Value> {
        self.render_children(&decode_list(defs), 0)
    }

    fn rt(&self, text: &str) -> Value {
        rich_text(text, self.max_text_chars)
    }

    fn render_children(&self, children: &[Block], depth: usize) -> Vec<Value> {
        let mut out = Vec::with_capacity(children.len());
        for child in children {
            self.render_into(child, depth, &mut out);
        }
        out
    }

    /// Render `block` at `depth`. Past the nesting limit a block loses its
    /// children, which follow it as siblings instead.
    fn render_into(&self, block: &Block, depth: usize, out: &mut Vec<Value>) {
        match block {
            // Columns nest their content two levels down
            Block::ColumnList { columns } if depth + 2 > MAX_NESTING_DEPTH => {
                for column in columns {
                    out.extend(self.render_children(column, depth));
                }
            }
            Block::Table { rows, .. } if depth >= MAX_NESTING_DEPTH => {
                for row in rows {
                    out.push(json!({"paragraph": {"rich_text": self.rt(&row.join(" | "))}}));
                }
            }
            _ if depth >= MAX_NESTING_DEPTH => {
                out.push(self.render_at(block, depth));
                out.extend(self.render_children(block.children(), depth));
            }
            _ => out.push(self.render_at(block, depth)),
        }
    }

    fn text_body(
        &self,
        text: &str,
        color: Option<&String>,
        children: &[Block],
        depth: usize,
    ) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("rich_text".to_string(), self.rt(text));
        if let Some(color) = color {
            body.insert("color".to_string(), json!(color));
        }
        if !children.is_empty() && depth < MAX_NESTING_DEPTH {
            body.insert(
                "children".to_string(),
                Value::Array(self.render_children(children, depth + 1)),
            );
        }
        body
    }

    fn diagnostic(&self, message: &str) -> Value {
        json!({"paragraph": {"rich_text": self.rt(message)}})
    }

    /// Render a decoded top-level block to API JSON.
    pub fn render(&self, block: &Block) -> Value {
        self.render_at(block, 0)
    }

    fn render_at(&self, block: &Block, depth: usize) -> Value {
        let type_name = block.type_name();
        let body: Value = match block {
            Block::Paragraph { text, color, children } => {
                Value::Object(self.text_body(text, color.as_ref(), children, depth))
            }
            Block::Heading { text, color, toggleable, children, .. } => {
                let nested: &[Block] = if *toggleable { children } else { &[] };
                let mut body = self.text_body(text, color.as_ref(), nested, depth);
                if *toggleable {
                    body.insert("is_toggleable".to_string(), json!(true));
                }
                Value::Object(body)
            }
            Block::BulletedListItem { text, children }
            | Block::NumberedListItem { text, children }
            | Block::Quote { text, children }
            | Block::Toggle { text, children } => {
                Value::Object(self.text_body(text, None, children, depth))
            }
            Block::Callout { text, icon, color, children } => {
                let mut body = self.text_body(text, color.as_ref(), children, depth);
                if let Some(icon) = icon {
                    body.insert("icon".to_string(), icon_json(icon));
                }
                Value::Object(body)
            }
            Block::Code { text, language } => json!({
                "rich_text": self.rt(text),
                "language": language,
            }),
            Block::Divider | Block::TableOfContents | Block::Breadcrumb => json!({}),
            Block::ToDo { text, checked, children } => {
                let mut body = self.text_body(text, None, children, depth);
                body.insert("checked".to_string(), json!(checked));
                Value::Object(body)
            }
            Block::Media { kind, url, caption } => match kind {
                MediaKind::Embed => json!({"url": url}),
                MediaKind::Bookmark => {
                    let mut body = json!({"url": url});
                    if let Some(caption) = caption {
                        body["caption"] = self.rt(caption);
                    }
                    body
                }
                _ => {
                    let mut body = json!({"type": "external", "external": {"url": url}});
                    if let Some(caption) = caption {
                        body["caption"] = self.rt(caption);
                    }
                    body
                }
            },
            Block::Table { rows, has_column_header, has_row_header } => {
                let width = rows.first().map(Vec::len).unwrap_or(1);
                let children: Vec<Value> = rows
                    .iter()
                    .map(|row| {
                        let cells: Vec<Value> = row.iter().map(|c| self.rt(c)).collect();
                        json!({"table_row": {"cells": cells}})
                    })
                    .collect();
                json!({
                    "table_width": width,
                    "has_column_header": has_column_header,
                    "has_row_header": has_row_header,
                    "children": children,
                })
            }
            // Sub-pages are created as pages of their own, never inline
            Block::ChildPage { title } => {
                return self.diagnostic(&format!(
                    "[CHILD_PAGE: '{}' must be a top-level block]",
                    title
                ))
            }
            Block::LinkToPage { target } => match self.resolve_link(target) {
                Some(body) => body,
                None => {
                    let name = match target {
                        LinkTarget::PageTitle(t) | LinkTarget::DatabaseTitle(t) => t.as_str(),
                        LinkTarget::PageId(id) | LinkTarget::DatabaseId(id) => id.as_str(),
                    };
                    return self.diagnostic(&format!("[LINK_TO_PAGE: '{}' not found]", name));
                }
            },
            Block::ColumnList { columns } => {
                let columns: Vec<Value> = columns
                    .iter()
                    .map(|col| json!({"column": {"children": self.render_children(col, depth + 2)}}))
                    .collect();
                json!({"children": columns})
            }
            Block::Unsupported { diagnostic } => return self.diagnostic(diagnostic),
        };

        let mut out = Map::new();
        out.insert(type_name.to_string(), body);
        Value::Object(out)
    }

    /// `link_to_page` body for `target`, if its ID is known.
    pub fn resolve_link(&self, target: &LinkTarget) -> Option<Value> {
        match target {
            LinkTarget::PageId(id) => Some(json!({"type": "page_id", "page_id": id})),
            LinkTarget::DatabaseId(id) => Some(json!({"type": "database_id", "database_id": id})),
            LinkTarget::PageTitle(title) => self
                .pages?
                .get(title)
                .map(|id| json!({"type": "page_id", "page_id": id})),
            LinkTarget::DatabaseTitle(title) => self
                .databases?
                .get(title)
                .map(|id| json!({"type": "database_id", "database_id": id})),
        }
    }
}

/// Icon JSON: emoji for short non-URL strings, external file for URLs.
pub fn icon_json(icon: &str) -> Value {
    if is_http_url(icon) {
        json!({"type": "external", "external": {"url": icon}})
    } else {
        json!({"type": "emoji", "emoji": icon})
    }
}

/// Build one block with default limits.
pub fn build_block(def: &Value) -> Value {
    BlockBuilder::default().build(def)
}

/// Build a list of blocks with default limits.
pub fn build_blocks(defs: &[Value]) -> Vec<Value> {
    BlockBuilder::default().build_all(defs)
}
