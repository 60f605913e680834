//! Prompt tables and instruction builders
//!
//! Theme and style names arrive from the UI as free text. Each table has a
//! fallback entry (the first row) used when the name is not recognized.

use std::fmt::Write;

/// Narrative theme: steers both image content and the narrator
#[derive(Debug, PartialEq, Eq)]
pub struct Theme {
    pub name: &'static str,
    /// Appended to every image instruction
    pub content_modifier: &'static str,
    /// Voice and genre guidance for the choice narrator
    pub narrator: &'static str,
}

/// Visual rendering style for generated scenes
#[derive(Debug, PartialEq, Eq)]
pub struct Style {
    pub name: &'static str,
    pub modifier: &'static str,
}

const THEMES: &[Theme] = &[
    Theme {
        name: "fantasy",
        content_modifier: "a high-fantasy world of ancient forests, ruined keeps, and quiet magic",
        narrator: "You narrate a high-fantasy adventure. Favor wonder, old mysteries, and consequences that echo.",
    },
    Theme {
        name: "sci-fi",
        content_modifier: "a far-future setting of starships, orbital stations, and alien worlds",
        narrator: "You narrate a science-fiction adventure. Favor discovery, strange technology, and hard choices under pressure.",
    },
    Theme {
        name: "noir",
        content_modifier: "a rain-soaked 1940s city of neon signs, long shadows, and smoke",
        narrator: "You narrate a hardboiled noir mystery. Favor suspicion, moral gray areas, and clipped, atmospheric prose.",
    },
    Theme {
        name: "horror",
        content_modifier: "an unsettling, dimly lit world where something is always slightly wrong",
        narrator: "You narrate a slow-burn horror story. Favor dread over gore and let the unknown stay unknown.",
    },
    Theme {
        name: "post-apocalyptic",
        content_modifier: "a scavenged wasteland of rusted cities, dust storms, and makeshift shelters",
        narrator: "You narrate a post-apocalyptic survival story. Favor scarcity, improvisation, and fragile trust.",
    },
];

const STYLES: &[Style] = &[
    Style {
        name: "painterly",
        modifier: "rendered as a rich digital painting with visible brushwork and dramatic lighting",
    },
    Style {
        name: "photoreal",
        modifier: "rendered photorealistically with natural lighting and a cinematic lens",
    },
    Style {
        name: "anime",
        modifier: "rendered in a clean anime illustration style with crisp linework",
    },
    Style {
        name: "pixel-art",
        modifier: "rendered as detailed 16-bit pixel art with a limited palette",
    },
    Style {
        name: "watercolor",
        modifier: "rendered as a soft watercolor illustration with bleeding edges",
    },
];

/// Sent with the first scene image; the answer seeds all later narration
pub const GROUNDING_PROMPT: &str = "Describe this scene in one paragraph for a storyteller who cannot see it. \
Cover the setting, notable characters and objects, their positions, the lighting and the mood. \
Describe only what is visible. Do not invent backstory or offer choices.";

/// Trailing request appended to the narrative thread for every choice call
pub const CHOICE_REQUEST_PROMPT: &str =
    "Continue the story from the player's last action and offer exactly three next actions.";

const CHOICE_FORMAT_RULES: &str = r#"

Rules:
- Base everything on the scene description and the player's actions so far.
- Offer exactly three distinct actions the player could take next, each a single short imperative sentence.
- Respond only with JSON of the form {"choices": ["...", "...", "..."]}."#;

/// Look up a theme by name, falling back to the first entry
pub fn theme(name: &str) -> &'static Theme {
    let key = normalize_key(name);
    THEMES
        .iter()
        .find(|t| t.name == key)
        .unwrap_or(&THEMES[0])
}

/// Look up a style by name, falling back to the first entry
pub fn style(name: &str) -> &'static Style {
    let key = normalize_key(name);
    STYLES
        .iter()
        .find(|s| s.name == key)
        .unwrap_or(&STYLES[0])
}

/// The fallback theme and style, used before any turn has chosen one
pub fn defaults() -> (&'static Theme, &'static Style) {
    (&THEMES[0], &STYLES[0])
}

pub fn theme_names() -> Vec<&'static str> {
    THEMES.iter().map(|t| t.name).collect()
}

pub fn style_names() -> Vec<&'static str> {
    STYLES.iter().map(|s| s.name).collect()
}

fn normalize_key(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace([' ', '_'], "-")
}

/// How an image instruction is phrased
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionMode {
    /// Move the story forward: a new scene following from the action
    Advance,
    /// Edit the current scene in place
    Refine,
}

/// Build the instruction part appended to the image thread for one call.
pub fn image_instruction(
    text: &str,
    theme: &Theme,
    style: &Style,
    mode: InstructionMode,
    first_scene: bool,
) -> String {
    let mut prompt = String::new();
    let text = text.trim();

    match mode {
        InstructionMode::Advance if first_scene => {
            let _ = write!(prompt, "Create the opening scene of an interactive story: {text}.");
        }
        InstructionMode::Advance => {
            let _ = write!(
                prompt,
                "Continue the story from the previous image. The player chose: {text}. \
                Show the next scene that results, keeping characters and setting consistent."
            );
        }
        InstructionMode::Refine => {
            let _ = write!(
                prompt,
                "Edit the previous image: {text}. \
                Keep the composition, characters and setting unchanged except for this edit."
            );
        }
    }

    let _ = write!(
        prompt,
        " Setting: {}. Style: {}. Do not include any text or captions in the image.",
        theme.content_modifier, style.modifier
    );
    prompt
}

/// System instruction for the choice narrator.
pub fn narrator_instruction(theme: &Theme) -> String {
    let mut prompt = String::from(theme.narrator);
    prompt.push_str(CHOICE_FORMAT_RULES);
    prompt
}
