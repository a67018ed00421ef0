//! Instruction templates sent to the generation models.
//!
//! User text arrives in the configured [`Language`]; the image directives are
//! always English because the image model follows English constraints most
//! reliably.

use studio_contracts::{EnhancementOptions, Language, UpscaleFactor};

struct Phrases {
    repair: &'static str,
    colorize: &'static str,
    upscale: &'static str,
    improve: &'static str,
    compose_default: &'static str,
    compose_empty: &'static str,
    restore_empty: &'static str,
    ordinal_example: &'static str,
    sample_output: &'static str,
}

const KOREAN: Phrases = Phrases {
    repair: "이미지의 긁힘, 찢어짐, 빛바램 등 모든 손상을 완벽하게 복원하고 선명도를 높여주세요.",
    colorize: "흑백 사진이라면 세피아 톤이 아닌, 풍부하고 생생한 현실적인 색상으로 채색해주세요. 각 사물과 배경에 가장 어울리는 다채로운 색을 입혀주세요.",
    upscale: "최종 결과물은 원본보다 {factor} 더 선명하게 업스케일링해주세요.",
    improve: "이 사진을 개선해주세요.",
    compose_default: "사진 속 인물이 추가된 모든 사물과 자연스럽게 상호작용하도록 합성해주세요. 사물의 원본 디자인, 색상, 형태는 절대 변경하지 마세요.",
    compose_empty: "이미지들을 자연스럽게 합성해줘.",
    restore_empty: "이 사진을 복원하고 색을 입혀줘.",
    ordinal_example: "Refer to the objects as \"첫 번째 사물\", \"두 번째 사물\", and so on. For example, instead of \"use the objects,\" write \"첫 번째 사물인 선글라스는 얼굴에 착용하고, 두 번째 사물인 책은 왼손에 들게 하세요.\" (The first object, sunglasses, should be worn on the face, and the second object, a book, should be held in the left hand).",
    sample_output: "사진 속 인물이 첫 번째 사물인 선글라스는 착용하고, 두 번째 사물인 책은 왼손에 들고 있도록 사실적으로 합성해 주세요. 모든 사물의 원본 디자인은 절대 변경하지 마세요.",
};

const ENGLISH: Phrases = Phrases {
    repair: "Fully repair all damage such as scratches, tears, and fading, and increase sharpness.",
    colorize: "If this is a black-and-white photo, colorize it with rich, vivid, realistic colors instead of sepia tones. Give each object and the background the colors that suit it best.",
    upscale: "Upscale the final result to {factor} the original resolution with sharper detail.",
    improve: "Please improve this photo.",
    compose_default: "Composite the images so the person in the photo interacts naturally with every added object. Never change the original design, color, or shape of the objects.",
    compose_empty: "Blend the images together naturally.",
    restore_empty: "Restore this photo and colorize it.",
    ordinal_example: "Refer to the objects as \"the first object\", \"the second object\", and so on. For example, instead of \"use the objects,\" write \"Have the subject wear the first object, the sunglasses, on the face, and hold the second object, the book, in the left hand.\"",
    sample_output: "Realistically composite the photo so the person wears the first object, the sunglasses, and holds the second object, the book, in the left hand. Never change the original design of any object.",
};

fn phrases(language: Language) -> &'static Phrases {
    match language {
        Language::Korean => &KOREAN,
        Language::English => &ENGLISH,
    }
}

pub const COMPOSE_CLAUSE_INCLUDE_ALL: &str = "**INCLUDE ALL OBJECTS:**";
pub const COMPOSE_CLAUSE_NOT_OVERLAY: &str = "**THIS IS NOT A SIMPLE OVERLAY:**";
pub const COMPOSE_CLAUSE_PRESERVE: &str = "**PRESERVE OBJECTS:**";
pub const COMPOSE_CLAUSE_IMAGE_ONLY: &str = "**IMAGE OUTPUT ONLY:**";

/// Instruction derived from the restore toggles.
///
/// Clauses appear in the order repair, colorize, upscale. With nothing
/// selected the result is only the "improve this photo" sentence.
pub fn build_restore_instruction(options: &EnhancementOptions, language: Language) -> String {
    let table = phrases(language);
    let mut parts: Vec<String> = Vec::new();
    if options.repair_damage {
        parts.push(table.repair.to_string());
    }
    if options.colorize {
        parts.push(table.colorize.to_string());
    }
    if options.upscale != UpscaleFactor::None {
        parts.push(table.upscale.replace("{factor}", options.upscale.as_str()));
    }
    if parts.is_empty() {
        return table.improve.to_string();
    }
    parts.join(" ")
}

pub fn repair_clause(language: Language) -> &'static str {
    phrases(language).repair
}

pub fn colorize_clause(language: Language) -> &'static str {
    phrases(language).colorize
}

pub fn improve_fallback(language: Language) -> &'static str {
    phrases(language).improve
}

/// Starting text of the compose screen.
pub fn default_compose_instruction(language: Language) -> &'static str {
    phrases(language).compose_default
}

/// Blank instructions are replaced before they reach a template.
pub fn compose_instruction_or_default(instruction: &str, language: Language) -> String {
    non_blank_or(instruction, phrases(language).compose_empty)
}

pub fn restore_instruction_or_default(instruction: &str, language: Language) -> String {
    non_blank_or(instruction, phrases(language).restore_empty)
}

fn non_blank_or(instruction: &str, fallback: &str) -> String {
    let trimmed = instruction.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Meta-instruction asking the text model to write one compose instruction.
pub fn composition_meta_prompt(language: Language, object_count: usize) -> String {
    let table = phrases(language);
    let name = language.display_name();
    format!(
        r#"You are a 'Creative Director AI' that writes instructions for a photo editing AI.
Your task is to analyze a base image and {object_count} object image(s) and write a single, clear, and specific instruction prompt in {name} for the editing AI.
The FIRST image after this text is the base image. Every image after it is an object image.

**The prompt you generate MUST instruct the editing AI to:**
1.  **Integrate ALL Objects:** State that the subject in the base image must interact with *all* provided objects.
2.  **Specify Interactions for EACH Object:** Describe how the subject should interact with each object individually. {ordinal}
3.  **Preserve Object Integrity:** Emphasize that the original design, color, and shape of the objects must NOT be changed.
4.  **Aim for Realism:** Mention the need for realistic lighting and shadows.

**Analyze the provided images and generate one detailed {name} sentence that meets all the above criteria.** Return ONLY the {name} text.

Example Output: "{sample}""#,
        ordinal = table.ordinal_example,
        sample = table.sample_output,
    )
}

pub fn translation_prompt(text: &str, language: Language) -> String {
    let name = language.display_name();
    format!(
        "Translate the following {name} text to English. Return only the translated English text, without any additional explanations or introductory phrases.\n\n{name} text: \"{text}\""
    )
}

pub fn analysis_prompt(language: Language) -> String {
    format!(
        "Describe the edited photo in one short {} sentence suitable as a gallery caption. Mention the main subject and any objects that were added. Return ONLY the caption.",
        language.display_name()
    )
}

/// Directive wrapped around the (translated) user instruction for compose.
pub fn compose_directive(instruction: &str) -> String {
    format!(
        r#"You are a world-class photo editing AI. Your task is to perform a realistic composite of several images.

**IMAGE ROLES:**
- The VERY FIRST image provided is the main background scene (the [BASE IMAGE]).
- ALL subsequent images are objects (the [OBJECT IMAGES]) that must be masterfully integrated into the [BASE IMAGE].

**YOUR MISSION:**
You must follow the user's request precisely. The user's request is: "{instruction}"

**CRITICAL INSTRUCTIONS (NON-NEGOTIABLE):**
1.  {COMPOSE_CLAUSE_INCLUDE_ALL} Every single [OBJECT IMAGE] must be present in the final output. No exceptions. If you are given 3 images in total (1 base, 2 objects), the final image must contain the background and both objects.
2.  {COMPOSE_CLAUSE_NOT_OVERLAY} This is a photorealistic integration. You MUST alter the subject in the [BASE IMAGE] to make the interaction believable. For example, you must change the person's hands to realistically hold an object, or place glasses perfectly on their face. The interaction must look completely natural.
3.  {COMPOSE_CLAUSE_PRESERVE} Do NOT alter the design, color, shape, or texture of the [OBJECT IMAGES]. They are fixed assets to be placed.
4.  **REALISM IS KEY:** The final image must have cohesive lighting, shadows, and perspective.
5.  {COMPOSE_CLAUSE_IMAGE_ONLY} Your only response is the final, high-resolution edited image. Do not output any text."#
    )
}

/// Directive wrapped around the (translated) user instruction for restore.
pub fn restore_directive(instruction: &str) -> String {
    format!(
        r#"You are an expert photo restoration AI. Your task is to restore the provided image according to the user's specific instructions.

**User's Request:** "{instruction}"

**Your Core Capabilities & Rules (Apply these when relevant to the user's request):**
1.  **When Colorizing:** You MUST use a rich, vibrant, and realistic color palette.
    -   **STRICTLY FORBIDDEN:** Absolutely no sepia tones, tinted monochrome, or desaturated filter effects. The goal is a full-color photograph, as if it were taken with a modern color camera.
    -   **METHOD:** Analyze the image content (sky, skin, clothing, objects) and apply distinct, appropriate, and lifelike colors to each element.
2.  **When Repairing Damage:** Fix all physical damage including scratches, tears, dust, and fading. Sharpen details and improve overall clarity significantly.
3.  **When Upscaling:** Enhance the image resolution as specified by the user (e.g., 2x, 4x), making it larger, clearer, and more detailed.

**Final Output:** Your ONLY response is the final, restored image. Do not output any text, descriptions, apologies, or explanations. Just the image."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(repair: bool, colorize: bool, upscale: UpscaleFactor) -> EnhancementOptions {
        EnhancementOptions {
            repair_damage: repair,
            colorize,
            upscale,
        }
    }

    #[test]
    fn colorize_without_repair_omits_repair_clause() {
        for language in [Language::Korean, Language::English] {
            let text =
                build_restore_instruction(&options(false, true, UpscaleFactor::None), language);
            assert!(text.contains(colorize_clause(language)));
            assert!(!text.contains(repair_clause(language)));
            assert!(!text.contains(improve_fallback(language)));
        }
    }

    #[test]
    fn nothing_selected_yields_only_the_fallback_sentence() {
        for language in [Language::Korean, Language::English] {
            let text =
                build_restore_instruction(&options(false, false, UpscaleFactor::None), language);
            assert_eq!(text, improve_fallback(language));
        }
        assert_eq!(
            build_restore_instruction(
                &options(false, false, UpscaleFactor::None),
                Language::English
            ),
            "Please improve this photo."
        );
    }

    #[test]
    fn all_options_join_in_order_with_factor() {
        let text = build_restore_instruction(&options(true, true, UpscaleFactor::X4), Language::English);
        let repair_at = text.find(repair_clause(Language::English));
        let colorize_at = text.find(colorize_clause(Language::English));
        let upscale_at = text.find("Upscale the final result to 4x");
        assert!(repair_at < colorize_at);
        assert!(colorize_at < upscale_at);
        assert!(upscale_at.is_some());
    }

    #[test]
    fn korean_upscale_clause_names_the_factor() {
        let text = build_restore_instruction(&options(false, false, UpscaleFactor::X2), Language::Korean);
        assert_eq!(text, "최종 결과물은 원본보다 2x 더 선명하게 업스케일링해주세요.");
    }

    #[test]
    fn compose_directive_wraps_instruction_with_fixed_clauses() {
        let directive = compose_directive("place glasses on the face");
        assert!(directive.contains("\"place glasses on the face\""));
        for clause in [
            COMPOSE_CLAUSE_INCLUDE_ALL,
            COMPOSE_CLAUSE_NOT_OVERLAY,
            COMPOSE_CLAUSE_PRESERVE,
            COMPOSE_CLAUSE_IMAGE_ONLY,
        ] {
            assert!(directive.contains(clause), "missing {clause}");
        }
        assert!(directive.contains("VERY FIRST image"));
    }

    #[test]
    fn restore_directive_carries_all_conditional_rules() {
        let directive = restore_directive("colorize it");
        assert!(directive.contains("\"colorize it\""));
        assert!(directive.contains("no sepia tones"));
        assert!(directive.contains("When Repairing Damage"));
        assert!(directive.contains("When Upscaling"));
    }

    #[test]
    fn meta_prompt_targets_user_language_and_ordinals() {
        let korean = composition_meta_prompt(Language::Korean, 2);
        assert!(korean.contains("instruction prompt in Korean"));
        assert!(korean.contains("첫 번째 사물"));
        assert!(korean.contains("2 object image(s)"));

        let english = composition_meta_prompt(Language::English, 1);
        assert!(english.contains("Return ONLY the English text."));
        assert!(english.contains("the first object"));
    }

    #[test]
    fn blank_instructions_get_language_defaults() {
        assert_eq!(
            compose_instruction_or_default("   ", Language::Korean),
            "이미지들을 자연스럽게 합성해줘."
        );
        assert_eq!(
            restore_instruction_or_default("", Language::English),
            "Restore this photo and colorize it."
        );
        assert_eq!(
            compose_instruction_or_default("  keep it  ", Language::English),
            "keep it"
        );
    }

    #[test]
    fn translation_prompt_quotes_source_text() {
        let prompt = translation_prompt("선글라스", Language::Korean);
        assert!(prompt.starts_with("Translate the following Korean text to English."));
        assert!(prompt.ends_with("Korean text: \"선글라스\""));
    }
}
