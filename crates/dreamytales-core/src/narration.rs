//! Prompt building and narration text preparation.
//!
//! Pure functions, no I/O: the chat prompt sent to the text generator, parsing
//! of its JSON reply, the text handed to speech synthesis and its SSML
//! envelope.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{GeneratedStory, Language, StorySettings};

/// How much of the previous episode is quoted back for a sequel.
pub const SEQUEL_EXCERPT_CHARS: usize = 800;

// Markdown and fence patterns.
static RE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").unwrap());
static RE_BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static RE_ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static RE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s*").unwrap());
static RE_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static RE_MULTI_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryPrompt {
    pub system: String,
    pub user: String,
}

/// Build the system prompt and opening user message for one story.
///
/// With `sequel`, the previous episode (cut to [`SEQUEL_EXCERPT_CHARS`]) is
/// quoted and the model is asked to continue it in the new scene.
pub fn story_prompt(settings: &StorySettings, sequel: Option<&str>) -> StoryPrompt {
    let StorySettings {
        child_name,
        age,
        main_character,
        secondary_characters,
        scene,
        theme,
        language,
        custom_prompt,
        ..
    } = settings;

    let companions = if secondary_characters.is_empty() {
        String::new()
    } else {
        format!("和其他小伙伴: {}", secondary_characters.join(", "))
    };
    let extra = custom_prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or("无");
    let style = match language {
        Language::Chinese => "中文",
        Language::English => "English",
    };

    let system = format!(
        "你是一个温柔的睡前故事讲述者。\n\
         请为一个叫 {child_name} 的 {age} 岁小朋友讲一个睡前故事。\n\
         \n\
         【故事设定】\n\
         1. 故事背景/场景: {scene}。\n\
         2. 核心主角: {child_name} (小朋友本人)。\n\
         3. 陪伴伙伴: 最好的朋友 {main_character} {companions}。\n\
         4. 故事主题/寓意: {theme}。\n\
         5. 额外要求: {extra}。\n\
         \n\
         【讲述要求】\n\
         1. 语气温柔、舒缓、有画面感，适合儿童睡前。\n\
         2. 故事温馨正能量，结局安心。\n\
         3. 语言风格: {style}。\n\
         4. 字数适中，适合3-5分钟朗读。\n\
         \n\
         请严格按照以下 JSON 格式返回结果：\n\
         {{\n  \"title\": \"一个简短可爱的标题\",\n  \"content\": \"故事的正文内容...\"\n}}\n"
    );

    let mut user = String::from("请开始讲故事。");
    if let Some(previous) = sequel.map(str::trim).filter(|p| !p.is_empty()) {
        let excerpt: String = previous.chars().take(SEQUEL_EXCERPT_CHARS).collect();
        user.push_str(&format!(
            "\n\n【续集模式开启】\n\
             这是一个连续剧故事的最新一集。\n\
             \n\
             上一集剧情回顾:\n\"{excerpt}...\"\n\
             \n\
             续写要求:\n\
             1. 必须自然承接上一集结尾或核心事件。\n\
             2. 角色要记得上一集发生的事。\n\
             3. 在新场景 {scene} 中展开，但融入上一集元素。\n\
             4. 保持角色性格一致。\n\
             \n\
             请开始讲述续集！"
        ));
    }

    StoryPrompt { system, user }
}

/// Parse the model's `{"title": ..., "content": ...}` reply.
///
/// A surrounding ```json fence is tolerated. Missing or non-string fields
/// become empty strings; anything that is not a JSON object is an error.
pub fn parse_story_reply(reply: &str) -> Result<GeneratedStory, String> {
    let body = match RE_FENCE.captures(reply) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => reply.trim(),
    };
    if body.is_empty() {
        return Err("no content from model".into());
    }

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| format!("model did not return valid JSON: {e}"))?;
    let object = value
        .as_object()
        .ok_or_else(|| "model did not return a JSON object".to_string())?;

    let field = |name: &str| match object.get(name) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    Ok(GeneratedStory {
        title: field("title"),
        content: field("content"),
    })
}

/// The text read aloud: title, a pause, then the body, with markdown
/// emphasis and headings removed.
pub fn narration_text(story: &GeneratedStory) -> String {
    let title = clean_for_speech(&story.title);
    let content = clean_for_speech(&story.content);
    match (title.is_empty(), content.is_empty()) {
        (true, _) => content,
        (false, true) => title,
        (false, false) => format!("{title}. {content}"),
    }
}

fn clean_for_speech(text: &str) -> String {
    let mut c = RE_BOLD.replace_all(text, "$1").into_owned();
    c = RE_ITALIC.replace_all(&c, "$1").into_owned();
    c = RE_HEADING.replace_all(&c, "").into_owned();
    c = RE_BLANK_LINES.replace_all(&c, "\n\n").into_owned();
    c = RE_MULTI_SPACE.replace_all(&c, " ").into_owned();
    c.trim().to_string()
}

pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Voice parameters for the SSML envelope.
#[derive(Debug, Clone, Copy)]
pub struct Voice<'a> {
    pub name: &'a str,
    pub style: &'a str,
    pub rate: &'a str,
    pub pitch: &'a str,
}

/// Wrap narration text in the Azure SSML envelope.
pub fn build_ssml(text: &str, voice: Voice<'_>) -> String {
    let safe = escape_xml(text);
    let Voice {
        name,
        style,
        rate,
        pitch,
    } = voice;
    format!(
        "<speak version='1.0' xml:lang='zh-CN' xmlns='http://www.w3.org/2001/10/synthesis' \
         xmlns:mstts='http://www.w3.org/2001/mstts'>\
         <voice name='{name}'>\
         <mstts:express-as style='{style}'>\
         <prosody rate='{rate}' pitch='{pitch}'>{safe}</prosody>\
         </mstts:express-as>\
         </voice>\
         </speak>"
    )
}

/// `m:ss`, e.g. `3:07`.
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}
