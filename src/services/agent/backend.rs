use crate::core::error::{Result, StoryError};
use crate::core::io::{find_latest_upload, Storage};
use crate::services::llm::LlmClient;
use crate::utils::json::{parse_model_json, truncate, with_fallback, FallbackPolicy};
use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const MIN_SLIDES: usize = 5;
const DEFAULT_SLIDE_DURATION: u32 = 8;
const STORY_DATA_MARKER: &str = "STORY_DATA: ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    #[serde(default = "unknown_name")]
    pub name: String,
    #[serde(default = "no_description")]
    pub description: String,
    #[serde(default)]
    pub traits: Vec<String>,
}

fn unknown_name() -> String {
    "Unknown".to_string()
}

fn no_description() -> String {
    "No description".to_string()
}

impl Character {
    fn placeholder() -> Self {
        Self {
            name: "Sample Character".to_string(),
            description: "A character from the comic".to_string(),
            traits: vec!["brave".to_string(), "mysterious".to_string()],
        }
    }
}

/// Models are loose with slide types: ids arrive as numbers and durations
/// as fractions or strings like `"8s"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    #[serde(default, deserialize_with = "text_from_any")]
    pub id: String,
    #[serde(default, deserialize_with = "text_from_any")]
    pub caption: String,
    #[serde(default = "default_duration", deserialize_with = "seconds_from_any")]
    pub duration: u32,
}

fn default_duration() -> u32 {
    DEFAULT_SLIDE_DURATION
}

fn text_from_any<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Rounds to whole seconds. Anything unusable becomes the default duration.
fn seconds_from_any<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let seconds = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('s').trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(seconds
        .filter(|s| s.is_finite() && *s >= 0.5 && *s <= u32::MAX as f64)
        .map(|s| s.round() as u32)
        .unwrap_or(DEFAULT_SLIDE_DURATION))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryData {
    #[serde(default = "untitled")]
    pub title: String,
    #[serde(default)]
    pub slides: Vec<Slide>,
}

fn untitled() -> String {
    "Untitled Story".to_string()
}

/// Appends placeholder slides until there are [`MIN_SLIDES`]. Existing
/// slides keep their order and extra slides are never removed.
pub fn backfill_slides(slides: &mut Vec<Slide>, character_names: &[String]) {
    while slides.len() < MIN_SLIDES {
        slides.push(Slide {
            id: format!("slide-{}", slides.len() + 1),
            caption: format!(
                "The adventure continues with {}...",
                character_names.join(", ")
            ),
            duration: DEFAULT_SLIDE_DURATION,
        });
    }
}

#[derive(Deserialize)]
struct FileArgs {
    file_path: String,
}

#[derive(Deserialize)]
struct StoryArgs {
    characters: Vec<Character>,
    #[serde(default = "default_theme")]
    theme: String,
}

fn default_theme() -> String {
    "adventure".to_string()
}

fn extraction_prompt(content: &str) -> String {
    format!(
        "Extract all unique character names from this comic content.\n\
        For each character, provide:\n\
        - name: The character name\n\
        - description: A brief description (2-3 sentences)\n\
        - traits: Array of key personality traits or characteristics\n\n\
        Return as a JSON array of objects.\n\n\
        Content: {}...",
        content
    )
}

fn character_block(characters: &[Character]) -> String {
    let names: Vec<&str> = characters.iter().map(|c| c.name.as_str()).collect();
    let details: Vec<String> = characters
        .iter()
        .map(|c| format!("{}: {}", c.name, c.description))
        .collect();
    format!(
        "Create a fun, engaging kids story featuring these characters:\n{}\n\n\
        Character details:\n{}\n\n",
        names.join(", "),
        details.join("; ")
    )
}

fn long_story_prompt(characters: &[Character], theme: &str) -> String {
    format!(
        "{}Story requirements:\n\
        - Age-appropriate for children (5-10 years old)\n\
        - Include all characters\n\
        - Theme: {}\n\
        - Length: 300-500 words\n\
        - Clear beginning, middle, and end\n\
        - Emphasize friendship and teamwork\n\n\
        Write the story:",
        character_block(characters),
        theme
    )
}

fn slides_prompt(characters: &[Character], theme: &str) -> String {
    format!(
        "{}Story requirements:\n\
        - Age-appropriate for children (5-10 years old)\n\
        - Include all characters\n\
        - Theme: {}\n\
        - Total length: Under 50 words\n\
        - Create exactly {} slides\n\
        - Each slide should have a clear scene/action\n\
        - Clear beginning, middle, and end\n\
        - Emphasize friendship and teamwork\n\n\
        Format the response as JSON with this structure:\n\
        {{\"title\": \"Story Title\", \"slides\": [\
        {{\"id\": \"slide-1\", \"caption\": \"Slide 1 caption describing the scene\", \"duration\": 8}}, \
        ... one object per slide, up to \"slide-{}\"]}}\n\n\
        Generate the story:",
        character_block(characters),
        theme,
        MIN_SLIDES,
        MIN_SLIDES
    )
}

fn names_of(characters: &[Character]) -> Vec<String> {
    characters.iter().map(|c| c.name.clone()).collect()
}

/// The server-side tools the agent may call.
pub struct BackendTools {
    llm: Arc<dyn LlmClient>,
    storage: Arc<dyn Storage>,
    uploads_dir: PathBuf,
    model: String,
    content_limit: usize,
    policy: FallbackPolicy,
}

impl BackendTools {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        storage: Arc<dyn Storage>,
        uploads_dir: PathBuf,
        model: &str,
    ) -> Self {
        Self {
            llm,
            storage,
            uploads_dir,
            model: model.to_string(),
            content_limit: 4000,
            policy: FallbackPolicy::default(),
        }
    }

    pub fn with_content_limit(mut self, limit: usize) -> Self {
        self.content_limit = limit;
        self
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn read_comic(&self, path: &Path) -> Result<String> {
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            let bytes = self.storage.read(path).await?;
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }

        let path = path.to_path_buf();
        run_blocking(move || pdf_text(&path)).await
    }

    pub async fn extract_characters_from_comic(&self, file_path: &Path) -> Result<Vec<Character>> {
        info!("Extracting characters from {}", file_path.display());
        let content = self.read_comic(file_path).await?;
        let content = truncate(&content, self.content_limit);

        let reply = self
            .llm
            .prompt(&extraction_prompt(&content), &self.model)
            .await?;
        let characters = with_fallback(
            parse_model_json::<Vec<Character>>(&reply),
            self.policy,
            "character list",
            || vec![Character::placeholder()],
        )?;
        info!("Found {} characters", characters.len());
        Ok(characters)
    }

    pub async fn generate_character_story(
        &self,
        characters: &[Character],
        theme: &str,
    ) -> Result<String> {
        require_characters(characters)?;
        self.llm
            .prompt(&long_story_prompt(characters, theme), &self.model)
            .await
    }

    pub async fn upload_and_extract_comic(&self, file_path: &Path) -> Result<String> {
        let characters = self.extract_characters_from_comic(file_path).await?;
        if characters.is_empty() {
            return Err(StoryError::MissingInput(
                "No characters were found in the comic file.".to_string(),
            ));
        }

        let summary: Vec<String> = characters
            .iter()
            .map(|c| {
                format!(
                    "• **{}**: {} (Traits: {})",
                    c.name,
                    c.description,
                    c.traits.join(", ")
                )
            })
            .collect();
        Ok(format!(
            "Successfully extracted {} characters from the comic:\n\n{}\n\n\
            I will now create character cards for each of these characters on the canvas. \
            You can interact with them, edit their details, or ask me to generate a story featuring these characters.",
            characters.len(),
            summary.join("\n")
        ))
    }

    /// Extracts characters from the newest `comic-*.pdf` / `comic-*.txt`
    /// upload, newest by creation time.
    pub async fn process_uploaded_comic(&self) -> Result<String> {
        if !self.storage.exists(&self.uploads_dir).await? {
            return Err(StoryError::MissingInput(
                "No uploads directory found. Please upload a comic file first.".to_string(),
            ));
        }
        let latest = find_latest_upload(self.storage.as_ref(), &self.uploads_dir)
            .await?
            .ok_or_else(|| {
                StoryError::MissingInput(
                    "No comic files found in uploads directory. Please upload a comic file first."
                        .to_string(),
                )
            })?;
        info!("Processing latest upload: {}", latest.display());
        self.upload_and_extract_comic(&latest).await
    }

    /// Asks for a five-slide story. Short replies are back-filled; an
    /// unparsable reply becomes a placeholder story under the placeholder
    /// policy.
    pub async fn story_with_slides(&self, characters: &[Character], theme: &str) -> Result<StoryData> {
        require_characters(characters)?;
        let names = names_of(characters);

        let reply = self
            .llm
            .prompt(&slides_prompt(characters, theme), &self.model)
            .await?;
        let mut data = with_fallback(
            parse_model_json::<StoryData>(&reply),
            self.policy,
            "story slides",
            || StoryData {
                title: format!("The Adventure of {}", names.join(", ")),
                slides: Vec::new(),
            },
        )?;

        if data.slides.len() < MIN_SLIDES {
            warn!(
                "Model returned {} slides, back-filling to {}",
                data.slides.len(),
                MIN_SLIDES
            );
            backfill_slides(&mut data.slides, &names);
        }
        Ok(data)
    }

    pub async fn generate_story_with_slides(
        &self,
        characters: &[Character],
        theme: &str,
    ) -> Result<String> {
        let data = self.story_with_slides(characters, theme).await?;
        let story_json = serde_json::to_string(&data)
            .map_err(|e| StoryError::Validation(format!("Story data not serializable: {}", e)))?;
        Ok(format!(
            "Successfully generated a story with {} slides:\n\n**{}**\n\n\
            I will now create a story card with these slides. The story features {} and is perfect for kids aged 5-10.\n\n\
            {}{}",
            data.slides.len(),
            data.title,
            names_of(characters).join(", "),
            STORY_DATA_MARKER,
            story_json
        ))
    }

    /// Same story as [`Self::generate_story_with_slides`], rendered as
    /// instructions for building the story card through frontend tools.
    pub async fn generate_and_create_story(
        &self,
        characters: &[Character],
        theme: &str,
    ) -> Result<String> {
        let data = self.story_with_slides(characters, theme).await?;
        let slide_lines: Vec<String> = data
            .slides
            .iter()
            .enumerate()
            .map(|(i, s)| format!("Slide {}: {} (Duration: {}s)", i + 1, s.caption, s.duration))
            .collect();
        Ok(format!(
            "I will now create a story card with the generated story:\n\n**{}**\n\n\
            The story features {} and has {} slides. It's perfect for kids aged 5-10 and emphasizes friendship and teamwork.\n\n\
            Please create a story card with this title and add the following slides:\n{}",
            data.title,
            names_of(characters).join(", "),
            data.slides.len(),
            slide_lines.join("\n")
        ))
    }

    /// Runs the named backend tool with already-validated JSON arguments and
    /// returns the text handed back to the model.
    pub async fn dispatch(&self, name: &str, args: &Value) -> Result<String> {
        match name {
            "extract_characters_from_comic" => {
                let args: FileArgs = decode(name, args)?;
                let characters = self
                    .extract_characters_from_comic(Path::new(&args.file_path))
                    .await?;
                serde_json::to_string(&characters)
                    .map_err(|e| StoryError::Validation(format!("{}: {}", name, e)))
            }
            "generate_character_story" => {
                let args: StoryArgs = decode(name, args)?;
                self.generate_character_story(&args.characters, &args.theme).await
            }
            "upload_and_extract_comic" => {
                let args: FileArgs = decode(name, args)?;
                self.upload_and_extract_comic(Path::new(&args.file_path)).await
            }
            "process_uploaded_comic" => self.process_uploaded_comic().await,
            "generate_story_with_slides" => {
                let args: StoryArgs = decode(name, args)?;
                self.generate_story_with_slides(&args.characters, &args.theme).await
            }
            "generate_and_create_story" => {
                let args: StoryArgs = decode(name, args)?;
                self.generate_and_create_story(&args.characters, &args.theme).await
            }
            other => Err(StoryError::Validation(format!("Unknown backend tool: {}", other))),
        }
    }
}

fn require_characters(characters: &[Character]) -> Result<()> {
    if characters.is_empty() {
        return Err(StoryError::MissingInput(
            "No characters provided. Please extract characters from a comic first.".to_string(),
        ));
    }
    Ok(())
}

fn decode<T: serde::de::DeserializeOwned>(tool: &str, args: &Value) -> Result<T> {
    serde_json::from_value(args.clone())
        .map_err(|e| StoryError::Validation(format!("{}: invalid arguments: {}", tool, e)))
}

/// A panicked or cancelled task surfaces as an I/O failure.
async fn run_blocking<T, F>(job: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| StoryError::Io(std::io::Error::other(e)))?
}

fn pdf_text(path: &Path) -> Result<String> {
    let doc = lopdf::Document::load(path)
        .map_err(|e| StoryError::Validation(format!("Failed to load PDF {}: {}", path.display(), e)))?;
    let mut pages = Vec::new();
    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(text) => pages.push(text),
            Err(e) => warn!("Skipping page {} of {}: {}", page_num, path.display(), e),
        }
    }
    Ok(pages.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::io::NativeStorage;
    use crate::services::llm::{ChatMessage, ChatRequest};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct MockLlm {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for MockLlm {
        async fn complete(&self, request: ChatRequest) -> Result<ChatMessage> {
            let prompt = request
                .messages
                .last()
                .and_then(|m| m.content.clone())
                .unwrap_or_default();
            self.prompts.lock().unwrap().push(prompt);
            Ok(ChatMessage::assistant(self.reply.clone()))
        }
    }

    fn tools(reply: &str, uploads: &Path) -> (BackendTools, Arc<MockLlm>) {
        let llm = Arc::new(MockLlm {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let tools = BackendTools::new(
            llm.clone(),
            Arc::new(NativeStorage::new()),
            uploads.to_path_buf(),
            "gpt-3.5-turbo",
        );
        (tools, llm)
    }

    fn pip() -> Vec<Character> {
        vec![Character {
            name: "Pip".into(),
            description: "A small mouse".into(),
            traits: vec!["curious".into()],
        }]
    }

    #[test]
    fn test_backfill_keeps_originals_in_order() {
        let mut slides = vec![
            Slide { id: "a".into(), caption: "First".into(), duration: 3 },
            Slide { id: "b".into(), caption: "Second".into(), duration: 4 },
        ];
        backfill_slides(&mut slides, &["Pip".to_string(), "Tom".to_string()]);

        assert_eq!(slides.len(), 5);
        assert_eq!(slides[0].caption, "First");
        assert_eq!(slides[1].caption, "Second");
        for (i, slide) in slides.iter().enumerate().skip(2) {
            assert_eq!(slide.id, format!("slide-{}", i + 1));
            assert_eq!(slide.caption, "The adventure continues with Pip, Tom...");
            assert_eq!(slide.duration, 8);
        }
    }

    #[test]
    fn test_backfill_never_trims() {
        let mut slides: Vec<Slide> = (1..=7)
            .map(|i| Slide { id: format!("s{}", i), caption: String::new(), duration: 8 })
            .collect();
        backfill_slides(&mut slides, &[]);
        assert_eq!(slides.len(), 7);
    }

    #[tokio::test]
    async fn test_text_comic_extraction_truncates_content() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let comic = dir.path().join("comic-1.txt");
        std::fs::write(&comic, "x".repeat(50))?;
        let reply = json!([{"name": "Pip", "description": "A mouse", "traits": ["brave"]}]).to_string();
        let (tools, llm) = tools(&format!("```json\n{}\n```", reply), dir.path());
        let tools = tools.with_content_limit(10);

        let characters = tools.extract_characters_from_comic(&comic).await?;

        assert_eq!(characters.len(), 1);
        assert_eq!(characters[0].name, "Pip");
        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains(&format!("Content: {}...", "x".repeat(10))));
        assert!(!prompts[0].contains(&"x".repeat(11)));
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_characters_use_placeholder() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let comic = dir.path().join("comic-1.txt");
        std::fs::write(&comic, "Once upon a time")?;
        let (tools, _) = tools("Here are the characters: Pip and Tom", dir.path());

        let characters = tools.extract_characters_from_comic(&comic).await?;
        assert_eq!(characters, vec![Character::placeholder()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_characters_error_policy() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let comic = dir.path().join("comic-1.txt");
        std::fs::write(&comic, "Once upon a time")?;
        let (tools, _) = tools("not json", dir.path());
        let tools = tools.with_policy(FallbackPolicy::Error);

        let err = tools.extract_characters_from_comic(&comic).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        Ok(())
    }

    #[tokio::test]
    async fn test_process_uploaded_comic_missing_inputs() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (tools, _) = tools("[]", &dir.path().join("uploads"));
        let err = tools.process_uploaded_comic().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingInput);
        assert_eq!(
            err.to_string(),
            "No uploads directory found. Please upload a comic file first."
        );

        std::fs::create_dir(dir.path().join("uploads"))?;
        std::fs::write(dir.path().join("uploads/notes.txt"), "hello")?;
        let err = tools.process_uploaded_comic().await.unwrap_err();
        assert!(err.to_string().starts_with("No comic files found"));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_extraction_is_missing_input() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("comic-a.txt"), "Nobody here.")?;
        let (tools, _) = tools("[]", dir.path());

        let err = tools.process_uploaded_comic().await.unwrap_err();
        assert_eq!(err.to_string(), "No characters were found in the comic file.");
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_summary_lists_characters() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("comic-a.txt"), "Pip and Tom.")?;
        let reply = json!([
            {"name": "Pip", "description": "A mouse", "traits": ["brave", "small"]},
            {"name": "Tom"}
        ])
        .to_string();
        let (tools, _) = tools(&reply, dir.path());

        let summary = tools.process_uploaded_comic().await?;
        assert!(summary.starts_with("Successfully extracted 2 characters"));
        assert!(summary.contains("• **Pip**: A mouse (Traits: brave, small)"));
        assert!(summary.contains("• **Tom**: No description (Traits: )"));
        Ok(())
    }

    #[tokio::test]
    async fn test_story_with_slides_backfills_short_reply() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let reply = json!({
            "title": "Pip's Picnic",
            "slides": [
                {"id": "slide-1", "caption": "Pip packs a basket", "duration": 10},
                {"id": "slide-2", "caption": "Rain starts"}
            ]
        })
        .to_string();
        let (tools, _) = tools(&reply, dir.path());

        let data = tools.story_with_slides(&pip(), "sharing").await?;
        assert_eq!(data.title, "Pip's Picnic");
        assert_eq!(data.slides.len(), 5);
        assert_eq!(data.slides[0].duration, 10);
        assert_eq!(data.slides[1].duration, 8);
        assert_eq!(data.slides[4].caption, "The adventure continues with Pip...");
        Ok(())
    }

    #[tokio::test]
    async fn test_story_with_slides_accepts_loose_slide_types() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let reply = json!({
            "title": "Pip's Picnic",
            "slides": [
                {"id": 1, "caption": "Pip packs a basket", "duration": 7.5},
                {"id": 2, "caption": "Rain starts", "duration": "6s"},
                {"id": 3, "caption": "Tom brings an umbrella", "duration": null},
                {"id": "slide-4", "caption": "They share the cake", "duration": -2},
                {"id": 5, "caption": "The sun comes out", "duration": 9}
            ]
        })
        .to_string();
        let (tools, _) = tools(&reply, dir.path());
        let tools = tools.with_policy(FallbackPolicy::Error);

        let data = tools.story_with_slides(&pip(), "sharing").await?;
        assert_eq!(data.title, "Pip's Picnic");
        assert_eq!(data.slides.len(), 5);
        assert_eq!(data.slides[0].id, "1");
        assert_eq!(data.slides[0].caption, "Pip packs a basket");
        let durations: Vec<u32> = data.slides.iter().map(|s| s.duration).collect();
        assert_eq!(durations, vec![8, 6, 8, 8, 9]);
        assert_eq!(data.slides[3].id, "slide-4");
        Ok(())
    }

    fn one_page_pdf(text: &str) -> lopdf::Document {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[tokio::test]
    async fn test_pdf_comic_text_reaches_extraction_prompt() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let comic = dir.path().join("comic-1.pdf");
        one_page_pdf("Pip meets Tom at the old mill").save(&comic)?;
        let reply = json!([{"name": "Pip", "description": "A mouse"}]).to_string();
        let (tools, llm) = tools(&reply, dir.path());

        let summary = tools.process_uploaded_comic().await?;

        assert!(summary.starts_with("Successfully extracted 1 characters"));
        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("Pip meets Tom at the old mill"));
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_pdf_is_rejected_before_model_call() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let comic = dir.path().join("comic-1.pdf");
        std::fs::write(&comic, b"this is not a pdf at all")?;
        let (tools, llm) = tools("[]", dir.path());

        let err = tools.extract_characters_from_comic(&comic).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("Failed to load PDF"));
        assert!(llm.prompts.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_crashed_blocking_task_is_io_error() {
        let err = run_blocking(|| -> Result<String> { panic!("page decoder crashed") })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[tokio::test]
    async fn test_generate_story_with_slides_embeds_story_data() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (tools, _) = tools("I'd rather not.", dir.path());

        let text = tools.generate_story_with_slides(&pip(), "adventure").await?;
        let (_, data) = text.split_once(STORY_DATA_MARKER).unwrap();
        let data: StoryData = serde_json::from_str(data)?;
        assert_eq!(data.title, "The Adventure of Pip");
        assert_eq!(data.slides.len(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_dispatch() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let reply = json!({"title": "T", "slides": []}).to_string();
        let (tools, llm) = tools(&reply, dir.path());

        let text = tools
            .dispatch(
                "generate_and_create_story",
                &json!({"characters": [{"name": "Pip", "description": "A mouse"}]}),
            )
            .await?;
        assert!(text.contains("Slide 5: The adventure continues with Pip... (Duration: 8s)"));
        assert!(llm.prompts.lock().unwrap()[0].contains("Theme: adventure"));

        let err = tools
            .dispatch("generate_character_story", &json!({"characters": []}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingInput);

        let err = tools.dispatch("createItem", &json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        Ok(())
    }
}
