use crate::core::error::{Result, StoryError};
use crate::core::state::ItemType;
use crate::services::llm::{FunctionDefinition, ToolDefinition};
use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    /// A list of character objects (`name`, `description`, `traits`).
    Characters,
}

impl ParamType {
    fn schema(&self) -> Value {
        match self {
            ParamType::String => json!({"type": "string"}),
            ParamType::Integer => json!({"type": "integer"}),
            ParamType::Number => json!({"type": "number"}),
            ParamType::Boolean => json!({"type": "boolean"}),
            ParamType::Characters => json!({
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "description": {"type": "string"},
                        "traits": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["name"]
                }
            }),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Characters => value
                .as_array()
                .map_or(false, |items| items.iter().all(|i| i.get("name").map_or(false, Value::is_string))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: &'static str, param_type: ParamType, description: &'static str) -> Self {
        Self {
            name,
            param_type,
            description,
            required: true,
            allowed: None,
            default: None,
        }
    }

    pub fn optional(name: &'static str, param_type: ParamType, description: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn one_of(mut self, allowed: Vec<&'static str>) -> Self {
        self.allowed = Some(allowed);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    fn schema(&self) -> Value {
        let mut schema = self.param_type.schema();
        if let Value::Object(obj) = &mut schema {
            obj.insert("description".into(), json!(self.description));
            if let Some(allowed) = &self.allowed {
                obj.insert("enum".into(), json!(allowed));
            }
            if let Some(default) = &self.default {
                obj.insert("default".into(), default.clone());
            }
        }
        schema
    }
}

/// Where a tool runs. Frontend tools are executed by the UI against the
/// shared state; backend tools are executed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSide {
    Frontend,
    Backend,
}

/// Declared capability: name, typed parameters and a description. Carries
/// no behaviour of its own.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    pub side: ToolSide,
}

impl ToolSpec {
    fn frontend(name: &'static str, description: &'static str, params: Vec<ParamSpec>) -> Self {
        Self {
            name,
            description,
            params,
            side: ToolSide::Frontend,
        }
    }

    fn backend(name: &'static str, description: &'static str, params: Vec<ParamSpec>) -> Self {
        Self {
            name,
            description,
            params,
            side: ToolSide::Backend,
        }
    }

    /// OpenAI function-calling definition with a JSON-schema parameter
    /// object.
    pub fn to_definition(&self) -> ToolDefinition {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.to_string(), p.schema()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: self.name.to_string(),
                description: self.description.to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }),
            },
        }
    }

    /// Checks a decoded argument object: no unknown keys, required keys
    /// present and non-null, values of the declared type and enumeration.
    pub fn validate_args(&self, args: &Value) -> Result<()> {
        let obj = args.as_object().ok_or_else(|| {
            StoryError::Validation(format!("{}: arguments must be a JSON object", self.name))
        })?;

        if let Some(unknown) = obj.keys().find(|k| !self.params.iter().any(|p| p.name == k.as_str())) {
            return Err(StoryError::Validation(format!(
                "{}: unknown argument '{}'",
                self.name, unknown
            )));
        }

        for param in &self.params {
            match obj.get(param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(StoryError::Validation(format!(
                        "{}: missing required argument '{}'",
                        self.name, param.name
                    )));
                }
                None | Some(Value::Null) => {}
                Some(value) => {
                    if !param.param_type.accepts(value) {
                        return Err(StoryError::Validation(format!(
                            "{}: argument '{}' must be of type {:?}",
                            self.name, param.name, param.param_type
                        )));
                    }
                    if let (Some(allowed), Some(s)) = (&param.allowed, value.as_str()) {
                        if !allowed.contains(&s) {
                            return Err(StoryError::Validation(format!(
                                "{}: '{}' is not one of: {}",
                                self.name,
                                s,
                                allowed.join(", ")
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Renders the call as `name(arg, arg, ...)` in parameter order, e.g.
    /// `createItem(story, Pip's Picnic)`. Absent arguments print as `null`.
    pub fn describe_call(&self, args: &Value) -> String {
        let rendered: Vec<String> = self
            .params
            .iter()
            .map(|p| match args.get(p.name) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => "null".to_string(),
                Some(other) => other.to_string(),
            })
            .collect();
        format!("{}({})", self.name, rendered.join(", "))
    }
}

fn text(name: &'static str, description: &'static str) -> ParamSpec {
    ParamSpec::required(name, ParamType::String, description)
}

fn item_id(description: &'static str) -> ParamSpec {
    text("itemId", description)
}

fn index() -> ParamSpec {
    ParamSpec::required("index", ParamType::Integer, "Metric index (0-based).")
}

fn set_field(name: &'static str, value_desc: &'static str, id_desc: &'static str) -> ToolSpec {
    ToolSpec::frontend(name, "", vec![text("value", value_desc), item_id(id_desc)])
}

/// The UI-side tools, in the order they are offered to the model.
pub fn frontend_tools() -> Vec<ToolSpec> {
    vec![
        // Items and globals
        ToolSpec::frontend(
            "createItem",
            "Create a new canvas item and return its id.",
            vec![
                text("type", "One of: project, entity, note, chart, character, story.")
                    .one_of(ItemType::names()),
                ParamSpec::optional("name", ParamType::String, "Optional item name."),
            ],
        ),
        ToolSpec::frontend("deleteItem", "Delete an item by id.", vec![item_id("Target item id.")]),
        ToolSpec::frontend(
            "setItemName",
            "Set an item's name.",
            vec![text("name", "New item name/title."), item_id("Target item id.")],
        ),
        ToolSpec::frontend(
            "setItemSubtitleOrDescription",
            "Set an item's subtitle/description (not data fields).",
            vec![
                text("subtitle", "Item subtitle/short description."),
                item_id("Target item id."),
            ],
        ),
        ToolSpec::frontend(
            "setGlobalTitle",
            "Set the global canvas title.",
            vec![text("title", "New global title.")],
        ),
        ToolSpec::frontend(
            "setGlobalDescription",
            "Set the global canvas description.",
            vec![text("description", "New global description.")],
        ),
        // Notes
        set_field("setNoteField1", "New content for note.data.field1.", "Target note id."),
        ToolSpec::frontend(
            "appendNoteField1",
            "",
            vec![
                text("value", "Text to append to note.data.field1."),
                item_id("Target note id."),
                ParamSpec::optional("withNewline", ParamType::Boolean, "Prefix with newline if true."),
            ],
        ),
        ToolSpec::frontend("clearNoteField1", "", vec![item_id("Target note id.")]),
        // Projects
        set_field("setProjectField1", "New value for project.data.field1.", "Project id."),
        set_field("setProjectField2", "New value for project.data.field2.", "Project id."),
        ToolSpec::frontend(
            "setProjectField3",
            "",
            vec![
                text("date", "Date YYYY-MM-DD for project.data.field3."),
                item_id("Project id."),
            ],
        ),
        ToolSpec::frontend("clearProjectField3", "", vec![item_id("Project id.")]),
        ToolSpec::frontend(
            "addProjectChecklistItem",
            "",
            vec![
                item_id("Project id."),
                ParamSpec::optional("text", ParamType::String, "Checklist text."),
            ],
        ),
        ToolSpec::frontend(
            "setProjectChecklistItem",
            "",
            vec![
                item_id("Project id."),
                text("checklistItemId", "Checklist item id or index."),
                ParamSpec::optional("text", ParamType::String, "New text."),
                ParamSpec::optional("done", ParamType::Boolean, "New done status."),
            ],
        ),
        ToolSpec::frontend(
            "removeProjectChecklistItem",
            "",
            vec![item_id("Project id."), text("checklistItemId", "Checklist item id.")],
        ),
        // Entities
        set_field("setEntityField1", "New value for entity.data.field1.", "Entity id."),
        set_field("setEntityField2", "New value for entity.data.field2.", "Entity id."),
        ToolSpec::frontend(
            "addEntityField3",
            "",
            vec![text("tag", "Tag to add."), item_id("Entity id.")],
        ),
        ToolSpec::frontend(
            "removeEntityField3",
            "",
            vec![text("tag", "Tag to remove."), item_id("Entity id.")],
        ),
        // Charts
        ToolSpec::frontend(
            "addChartField1",
            "",
            vec![
                item_id("Chart id."),
                ParamSpec::optional("label", ParamType::String, "Metric label."),
                ParamSpec::optional("value", ParamType::Number, "Metric value 0..100."),
            ],
        ),
        ToolSpec::frontend(
            "setChartField1Label",
            "",
            vec![item_id("Chart id."), index(), text("label", "New metric label.")],
        ),
        ToolSpec::frontend(
            "setChartField1Value",
            "",
            vec![
                item_id("Chart id."),
                index(),
                ParamSpec::required("value", ParamType::Number, "Value 0..100."),
            ],
        ),
        ToolSpec::frontend("clearChartField1Value", "", vec![item_id("Chart id."), index()]),
        ToolSpec::frontend("removeChartField1", "", vec![item_id("Chart id."), index()]),
        // Characters
        ToolSpec::frontend(
            "setCharacterName",
            "",
            vec![text("name", "Character name."), item_id("Character id.")],
        ),
        ToolSpec::frontend(
            "setCharacterDescription",
            "",
            vec![text("description", "Character description."), item_id("Character id.")],
        ),
        ToolSpec::frontend(
            "addCharacterTrait",
            "",
            vec![text("trait", "Trait to add."), item_id("Character id.")],
        ),
        ToolSpec::frontend(
            "removeCharacterTrait",
            "",
            vec![text("trait", "Trait to remove."), item_id("Character id.")],
        ),
        ToolSpec::frontend(
            "setCharacterImageUrl",
            "",
            vec![text("image_url", "Image URL."), item_id("Character id.")],
        ),
        ToolSpec::frontend(
            "setCharacterSourceComic",
            "",
            vec![text("source_comic", "Source comic."), item_id("Character id.")],
        ),
        // Stories
        ToolSpec::frontend(
            "setStoryTitle",
            "",
            vec![text("title", "Story title."), item_id("Story id.")],
        ),
        ToolSpec::frontend(
            "addStorySlide",
            "",
            vec![
                item_id("Story id."),
                text("caption", "Slide caption."),
                ParamSpec::optional("duration", ParamType::Integer, "Slide duration in seconds.")
                    .default_value(json!(8)),
            ],
        ),
        ToolSpec::frontend(
            "setStorySlideCaption",
            "",
            vec![
                item_id("Story id."),
                text("slideId", "Slide id."),
                text("caption", "New slide caption."),
            ],
        ),
        ToolSpec::frontend(
            "setStorySlideDuration",
            "",
            vec![
                item_id("Story id."),
                text("slideId", "Slide id."),
                ParamSpec::required("duration", ParamType::Integer, "New slide duration in seconds."),
            ],
        ),
        ToolSpec::frontend(
            "removeStorySlide",
            "",
            vec![item_id("Story id."), text("slideId", "Slide id.")],
        ),
    ]
}

fn characters() -> ParamSpec {
    ParamSpec::required("characters", ParamType::Characters, "List of character data to use in the story")
}

fn theme() -> ParamSpec {
    ParamSpec::optional("theme", ParamType::String, "Story theme or prompt")
        .default_value(json!("adventure"))
}

fn comic_path(description: &'static str) -> ParamSpec {
    text("file_path", description)
}

pub fn backend_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::backend(
            "extract_characters_from_comic",
            "Extract characters from a comic PDF or text file and return character data.",
            vec![comic_path("Path to the PDF or text comic file")],
        ),
        ToolSpec::backend(
            "generate_character_story",
            "Generate a kids story using the extracted characters.",
            vec![characters(), theme()],
        ),
        ToolSpec::backend(
            "upload_and_extract_comic",
            "Upload a comic file and extract characters from it, then create character cards on the canvas.",
            vec![comic_path("Path to the comic file to upload and process")],
        ),
        ToolSpec::backend(
            "process_uploaded_comic",
            "Process the most recently uploaded comic file and extract characters from it.",
            vec![],
        ),
        ToolSpec::backend(
            "generate_story_with_slides",
            "Generate a kids story with extracted characters and create story slides (at least 5 slides).",
            vec![characters(), theme()],
        ),
        ToolSpec::backend(
            "generate_and_create_story",
            "Generate a kids story with extracted characters and automatically create a story card in the UI (under 50 words, 5 slides).",
            vec![characters(), theme()],
        ),
    ]
}

/// All declared tools, frontend first.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<ToolSpec>) -> Self {
        Self { tools }
    }

    pub fn standard() -> Self {
        let mut tools = frontend_tools();
        tools.extend(backend_tools());
        Self::new(tools)
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn all(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn by_side(&self, side: ToolSide) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter().filter(move |t| t.side == side)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolSpec::to_definition).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_standard_registry_counts() {
        let registry = ToolRegistry::standard();
        assert_eq!(registry.by_side(ToolSide::Frontend).count(), 36);
        assert_eq!(registry.by_side(ToolSide::Backend).count(), 6);

        let names: HashSet<_> = registry.all().iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 42, "tool names must be unique");
    }

    #[test]
    fn test_create_item_definition() {
        let registry = ToolRegistry::standard();
        let def = registry.get("createItem").unwrap().to_definition();
        assert_eq!(def.tool_type, "function");
        let params = &def.function.parameters;
        assert_eq!(params["required"], json!(["type"]));
        assert_eq!(
            params["properties"]["type"]["enum"],
            json!(["project", "entity", "note", "chart", "character", "story"])
        );
        assert_eq!(params["properties"]["name"]["type"], "string");
    }

    #[test]
    fn test_backend_defaults_exported() {
        let registry = ToolRegistry::standard();
        let def = registry.get("generate_and_create_story").unwrap().to_definition();
        let props = &def.function.parameters["properties"];
        assert_eq!(props["theme"]["default"], "adventure");
        assert_eq!(props["characters"]["type"], "array");
    }

    #[test]
    fn test_validate_args() {
        let registry = ToolRegistry::standard();
        let create = registry.get("createItem").unwrap();
        assert!(create.validate_args(&json!({"type": "story", "name": "Pip"})).is_ok());
        assert!(create.validate_args(&json!({"type": "note"})).is_ok());
        assert!(create.validate_args(&json!({"name": "Pip"})).is_err());
        assert!(create.validate_args(&json!({"type": "poster"})).is_err());
        assert!(create.validate_args(&json!({"type": "note", "color": "red"})).is_err());
        assert!(create.validate_args(&json!(["story"])).is_err());

        let chart = registry.get("setChartField1Value").unwrap();
        assert!(chart.validate_args(&json!({"itemId": "c1", "index": 0, "value": 42.5})).is_ok());
        assert!(chart.validate_args(&json!({"itemId": "c1", "index": "0", "value": 42.5})).is_err());

        let story = registry.get("generate_story_with_slides").unwrap();
        assert!(story
            .validate_args(&json!({"characters": [{"name": "Pip", "traits": ["brave"]}]}))
            .is_ok());
        assert!(story.validate_args(&json!({"characters": [{"traits": []}]})).is_err());
    }

    #[test]
    fn test_describe_call() {
        let registry = ToolRegistry::standard();
        let create = registry.get("createItem").unwrap();
        assert_eq!(
            create.describe_call(&json!({"type": "story", "name": "X"})),
            "createItem(story, X)"
        );
        assert_eq!(create.describe_call(&json!({"type": "note"})), "createItem(note, null)");

        let slide = registry.get("addStorySlide").unwrap();
        assert_eq!(
            slide.describe_call(&json!({"itemId": "s1", "caption": "Pip waves", "duration": 10})),
            "addStorySlide(s1, Pip waves, 10)"
        );
    }
}
