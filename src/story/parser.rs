//! Parsers for LLM-generated character profiles, scene outlines, and scripts.
//!
//! Generated text is never fully regular, so every extractor here is
//! tolerant: a field that cannot be found is simply left empty, and an
//! outline that resists parsing is kept verbatim as raw content.

use regex::Regex;

use crate::ids::short_id;
use crate::store::{Character, ScriptLine};

/// Fields extracted from one generated scene outline.
#[derive(Debug, Clone, Default)]
pub struct SceneOutline {
    pub setting: Option<String>,
    pub characters: Vec<String>,
    pub plot: Option<String>,
    pub dialogue: Option<String>,
    pub atmosphere: Option<String>,
    pub sound_effects: Option<String>,
    /// Raw outline text, kept when almost nothing could be extracted.
    pub content: Option<String>,
}

/// Split generated character text into profiles.
///
/// Blocks are separated by blank lines or numbered list markers. A block
/// only becomes a character when it yields a name plus at least one
/// descriptive field.
pub fn parse_characters(text: &str) -> Vec<Character> {
    let mut characters = Vec::new();

    let sections: Vec<String> = if let Ok(re) = Regex::new(r"\n\s*\n|\n\d+\.\s+") {
        re.split(text).map(|s| s.to_string()).collect()
    } else {
        vec![text.to_string()]
    };

    for section in &sections {
        if section.trim().is_empty() {
            continue;
        }

        let name = match character_name(section) {
            Some(name) => name,
            None => continue,
        };

        let species = single_field(section, r"(?i)Species:?\s*([A-Za-z\s\-]+)");
        let role = single_field(section, r"(?i)Role:?\s*([^\n]+)")
            .or_else(|| single_field(section, r"(?i)Position:?\s*([^\n]+)"));
        let personality = labeled_field(section, "Personality");
        let backstory =
            labeled_field(section, "Backstory").or_else(|| labeled_field(section, "Background"));
        let voice_description = labeled_field(section, "Voice");

        // A name alone is not enough to write for
        if role.is_none() && personality.is_none() {
            continue;
        }

        characters.push(Character {
            character_id: short_id("char_"),
            name,
            species,
            role,
            personality,
            backstory,
            voice_description,
        });
    }

    characters
}

fn character_name(section: &str) -> Option<String> {
    if let Ok(re) = Regex::new(r#"(?m)^[*#]*\s*(?:Name:?\s*)?([A-Za-z\s'"]+)"#) {
        if let Some(captures) = re.captures(section) {
            let name = captures.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    if let Ok(re) = Regex::new(r"^([A-Z][A-Za-z'\s]+)(?:\n|:)") {
        if let Some(captures) = re.captures(section) {
            let name = captures.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    None
}

/// Extract the labeled fields of a scene outline.
///
/// When one field or less can be found the raw text is preserved in
/// `content` so nothing the model wrote is lost.
pub fn parse_scene_outline(text: &str) -> SceneOutline {
    let mut outline = SceneOutline::default();
    let mut parsed_fields = 0;

    if let Some(setting) = labeled_field(text, "Setting") {
        outline.setting = Some(setting);
        parsed_fields += 1;
    }

    if let Some(characters) = labeled_field(text, "Characters?") {
        if let Ok(re) = Regex::new(r",|\n") {
            outline.characters = re
                .split(&characters)
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
        }
        parsed_fields += 1;
    }

    if let Some(plot) = labeled_field(text, "Plot") {
        outline.plot = Some(plot);
        parsed_fields += 1;
    }

    if let Some(dialogue) = labeled_field(text, "Dialogue") {
        outline.dialogue = Some(dialogue);
        parsed_fields += 1;
    }

    if let Some(atmosphere) =
        labeled_field(text, "Atmosphere").or_else(|| labeled_field(text, "Mood"))
    {
        outline.atmosphere = Some(atmosphere);
        parsed_fields += 1;
    }

    if let Some(sound_effects) =
        labeled_field(text, "Sound Effects").or_else(|| labeled_field(text, "Sound"))
    {
        outline.sound_effects = Some(sound_effects);
        parsed_fields += 1;
    }

    if parsed_fields <= 1 {
        outline.content = Some(text.to_string());
    }

    outline
}

/// Classify script paragraphs into dialogue, narration, descriptions,
/// and sound effect cues.
pub fn parse_script_lines(text: &str) -> Vec<ScriptLine> {
    let mut lines = Vec::new();

    let paragraphs: Vec<String> = if let Ok(re) = Regex::new(r"\n{2,}") {
        re.split(text).map(|p| p.to_string()).collect()
    } else {
        vec![text.to_string()]
    };

    for paragraph in &paragraphs {
        let mut paragraph = paragraph.trim().to_string();
        if paragraph.is_empty() {
            continue;
        }

        // Bracketed stage directions: a paragraph that is nothing but
        // brackets becomes a description, otherwise they are stripped.
        if let Ok(re) = Regex::new(r"\[(.*?)\]") {
            if let Some(captures) = re.captures(&paragraph) {
                let direction = captures
                    .get(1)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();
                let remaining = re.replace_all(&paragraph, "").trim().to_string();
                if remaining.is_empty() {
                    lines.push(ScriptLine::Description { content: direction });
                    continue;
                }
                paragraph = remaining;
            }
        }

        // A paragraph that is mostly one parenthetical is a sound cue
        if let Ok(re) = Regex::new(r"\((.*?)\)") {
            if let Some(captures) = re.captures(&paragraph) {
                let whole = captures.get(0).map(|m| m.as_str()).unwrap_or("");
                if whole.chars().count() as f64 > paragraph.chars().count() as f64 * 0.7 {
                    let content = captures
                        .get(1)
                        .map(|m| m.as_str().trim().to_string())
                        .unwrap_or_default();
                    lines.push(ScriptLine::SoundEffect { content });
                    continue;
                }
            }
        }

        if let Ok(re) = Regex::new(r"^([A-Z][A-Z\s]+)(?:\s*\(.*?\))?:\s*(.*)") {
            if let Some(captures) = re.captures(&paragraph) {
                let character = captures
                    .get(1)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();
                let content = captures
                    .get(2)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();
                if character == "NARRATOR" {
                    lines.push(ScriptLine::Narration { content });
                } else {
                    lines.push(ScriptLine::Dialogue { character, content });
                }
                continue;
            }
        }

        lines.push(ScriptLine::Description { content: paragraph });
    }

    lines
}

/// Normalize a generated episode title.
pub fn clean_title(raw: &str) -> String {
    let mut title = raw.trim().to_string();
    if title.len() >= 2 && title.starts_with('"') && title.ends_with('"') {
        title = title[1..title.len() - 1].to_string();
    }
    if title.chars().count() > 80 {
        title = title.chars().take(77).collect::<String>() + "...";
    }
    title
}

fn labeled_field(text: &str, label: &str) -> Option<String> {
    single_field(
        text,
        &format!(r"(?i){}:?\s*([^\n]+(?:\n[^\n]+)*?)(?:\n\s*[A-Za-z]+:|\z)", label),
    )
}

fn single_field(text: &str, pattern: &str) -> Option<String> {
    if let Ok(re) = Regex::new(pattern) {
        if let Some(captures) = re.captures(text) {
            let value = captures.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_characters_extracts_profiles() {
        let text = "**Commander Sela Vash**\n\
                    Species: Romulan (Tal Shiar defector)\n\
                    Role: Commanding officer of Starbase 47\n\
                    Personality: Disciplined, with a dry wit that surfaces under pressure.\n\
                    Backstory: Defected to the Federation during the Dominion War.\n\
                    Voice: Low and precise, with a clipped formal accent.\n\
                    2. **Doctor Elan Ryn**\n\
                    Species: Trill (joined host)\n\
                    Role: Chief medical officer\n\
                    Personality: Warm but blunt when triage starts.\n\
                    Backstory: Carries the Ryn symbiont and three lifetimes of field medicine.\n\
                    Voice: Bright tenor, quick cadence.\n\
                    3. **Ensign Blank**";

        let characters = parse_characters(text);
        assert_eq!(characters.len(), 2);

        let vash = &characters[0];
        assert!(vash.character_id.starts_with("char_"));
        assert_eq!(vash.name, "Commander Sela Vash");
        assert_eq!(vash.species.as_deref(), Some("Romulan"));
        assert_eq!(vash.role.as_deref(), Some("Commanding officer of Starbase 47"));
        assert_eq!(
            vash.personality.as_deref(),
            Some("Disciplined, with a dry wit that surfaces under pressure.")
        );
        assert_eq!(
            vash.backstory.as_deref(),
            Some("Defected to the Federation during the Dominion War.")
        );
        assert_eq!(
            vash.voice_description.as_deref(),
            Some("Low and precise, with a clipped formal accent.")
        );

        assert_eq!(characters[1].name, "Doctor Elan Ryn");
        assert_eq!(characters[1].species.as_deref(), Some("Trill"));
    }

    #[test]
    fn test_parse_characters_position_and_background_labels() {
        let text = "**Lieutenant Mara Senn**\n\
                    Position: Tactical officer\n\
                    Personality: Restless and exact.\n\
                    Background: Grew up on a mining colony near the Badlands.";

        let characters = parse_characters(text);
        assert_eq!(characters.len(), 1);
        assert_eq!(characters[0].role.as_deref(), Some("Tactical officer"));
        assert_eq!(
            characters[0].backstory.as_deref(),
            Some("Grew up on a mining colony near the Badlands.")
        );
        assert!(characters[0].voice_description.is_none());
    }

    #[test]
    fn test_parse_scene_outline_labeled_fields() {
        let text = "Sound Effects: Low engine hum, console chirps, a single alarm tone.\n\
                    Setting: The dim operations deck of Starbase 47.\n\
                    Characters: Commander Sela Vash, Doctor Elan Ryn\n\
                    Plot: A silent freighter drifts into the exclusion zone and refuses hails.\n\
                    Atmosphere: Tense and very quiet.\n\
                    Dialogue: Vash orders battle stations while Ryn argues for a rescue party.";

        let outline = parse_scene_outline(text);
        assert_eq!(
            outline.setting.as_deref(),
            Some("The dim operations deck of Starbase 47.")
        );
        assert_eq!(
            outline.characters,
            vec!["Commander Sela Vash".to_string(), "Doctor Elan Ryn".to_string()]
        );
        assert_eq!(
            outline.plot.as_deref(),
            Some("A silent freighter drifts into the exclusion zone and refuses hails.")
        );
        assert_eq!(outline.atmosphere.as_deref(), Some("Tense and very quiet."));
        assert_eq!(
            outline.sound_effects.as_deref(),
            Some("Low engine hum, console chirps, a single alarm tone.")
        );
        assert!(outline.content.is_none());
    }

    #[test]
    fn test_parse_scene_outline_keeps_raw_when_unstructured() {
        let prose = "The crew gathers in silence before the viewscreen, waiting for an answer.";
        let outline = parse_scene_outline(prose);
        assert!(outline.setting.is_none());
        assert!(outline.characters.is_empty());
        assert_eq!(outline.content.as_deref(), Some(prose));

        // A single recognized field still keeps the raw text around
        let sparse = "Setting: Deep space.";
        let outline = parse_scene_outline(sparse);
        assert_eq!(outline.setting.as_deref(), Some("Deep space."));
        assert_eq!(outline.content.as_deref(), Some(sparse));
    }

    #[test]
    fn test_parse_script_lines_classification() {
        let script = "[The operations deck at red alert]\n\n\
                      NARRATOR: The station had never been this quiet at battle stations.\n\n\
                      COMMANDER VASH (quietly): Hold position. Nobody fires first.\n\n\
                      (A low alarm tone builds and cuts out)\n\n\
                      The freighter drifts closer, its running lights dead.";

        let lines = parse_script_lines(script);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], ScriptLine::Description {
            content: "The operations deck at red alert".to_string(),
        });
        assert_eq!(lines[1], ScriptLine::Narration {
            content: "The station had never been this quiet at battle stations.".to_string(),
        });
        assert_eq!(lines[2], ScriptLine::Dialogue {
            character: "COMMANDER VASH".to_string(),
            content: "Hold position. Nobody fires first.".to_string(),
        });
        assert_eq!(lines[3], ScriptLine::SoundEffect {
            content: "A low alarm tone builds and cuts out".to_string(),
        });
        assert_eq!(lines[4], ScriptLine::Description {
            content: "The freighter drifts closer, its running lights dead.".to_string(),
        });
    }

    #[test]
    fn test_parse_script_lines_strips_inline_stage_directions() {
        let lines = parse_script_lines("KIRA: [turning] We are not alone out here.");
        assert_eq!(lines.len(), 1);
        match &lines[0] {
            ScriptLine::Dialogue { character, content } => {
                assert_eq!(character, "KIRA");
                assert_eq!(content, "We are not alone out here.");
            }
            other => panic!("expected dialogue, got {:?}", other),
        }
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("\"The Silent Approach\""), "The Silent Approach");
        assert_eq!(clean_title("  Echo Station  "), "Echo Station");
        assert_eq!(clean_title("\"Half quoted"), "\"Half quoted");

        let long = "A".repeat(90);
        let cleaned = clean_title(&long);
        assert_eq!(cleaned.chars().count(), 80);
        assert!(cleaned.ends_with("..."));
    }
}
