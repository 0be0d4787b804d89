/*!
 * Text rendering of assembled documents.
 *
 * Mono output holds the translation only; dual output places each original
 * block above its translation. Watermarked variants are framed by a header
 * and a footer line. Units that could not be translated keep their original
 * text behind an `[untranslated]` marker.
 */

use std::fmt::Write;

use super::assembler::{AssembledDocument, AssembledUnit, Layout, OutputVariant, UnitStatus};

/// Marker placed before original text that stands in for a translation
pub const UNTRANSLATED_MARKER: &str = "[untranslated]";

/// Render context shared by every variant of a run
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    pub source_language: &'a str,
    pub target_language: &'a str,
}

fn watermark_header(ctx: &RenderContext<'_>) -> String {
    format!(
        "[{} {}] Machine translation {} -> {}. Review before use.",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        ctx.source_language,
        ctx.target_language
    )
}

fn watermark_footer() -> String {
    format!("[{}] End of machine-translated document.", env!("CARGO_PKG_NAME"))
}

fn translated_text(unit: &AssembledUnit) -> String {
    match &unit.status {
        UnitStatus::Untranslated { .. } => format!("{} {}", UNTRANSLATED_MARKER, unit.source),
        _ => unit.text.clone(),
    }
}

/// Render one output variant. Deterministic for a given document.
pub fn render_variant(document: &AssembledDocument, variant: OutputVariant, ctx: &RenderContext<'_>) -> String {
    let mut out = String::new();

    if variant.watermarked {
        let _ = writeln!(out, "{}", watermark_header(ctx));
        out.push('\n');
    }

    for page in &document.pages {
        let _ = writeln!(out, "=== Page {} ===", page.page);
        for unit in &page.units {
            out.push('\n');
            match variant.layout {
                Layout::Mono => {
                    let _ = writeln!(out, "{}", translated_text(unit));
                }
                Layout::Dual => {
                    let _ = writeln!(out, "{}", unit.source);
                    let _ = writeln!(out, "{}", translated_text(unit));
                }
            }
        }
        out.push('\n');
    }

    if variant.watermarked {
        let _ = writeln!(out, "{}", watermark_footer());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::UnitKey;
    use crate::pipeline::assembler::AssembledPage;

    fn document() -> AssembledDocument {
        AssembledDocument {
            pages: vec![
                AssembledPage {
                    page: 1,
                    units: vec![
                        AssembledUnit {
                            key: UnitKey::new(1, "a"),
                            order: 0,
                            source: "Hello".to_string(),
                            text: "Bonjour".to_string(),
                            status: UnitStatus::Translated,
                        },
                        AssembledUnit {
                            key: UnitKey::new(1, "b"),
                            order: 1,
                            source: "World".to_string(),
                            text: "World".to_string(),
                            status: UnitStatus::Untranslated { reason: "bad key".to_string() },
                        },
                    ],
                },
                AssembledPage { page: 2, units: Vec::new() },
            ],
        }
    }

    fn ctx() -> RenderContext<'static> {
        RenderContext { source_language: "en", target_language: "fr" }
    }

    #[test]
    fn test_renderVariant_mono_shouldHoldTranslationsAndFallbacks() {
        let text = render_variant(&document(), OutputVariant::new(Layout::Mono, false), &ctx());
        assert_eq!(
            text,
            "=== Page 1 ===\n\nBonjour\n\n[untranslated] World\n\n=== Page 2 ===\n\n"
        );
    }

    #[test]
    fn test_renderVariant_dual_shouldInterleaveOriginal() {
        let text = render_variant(&document(), OutputVariant::new(Layout::Dual, false), &ctx());
        assert!(text.contains("Hello\nBonjour\n"));
        assert!(text.contains("World\n[untranslated] World\n"));
    }

    #[test]
    fn test_renderVariant_watermarked_shouldFrameDocument() {
        let text = render_variant(&document(), OutputVariant::new(Layout::Mono, true), &ctx());
        assert!(text.starts_with("[pdfdual "));
        assert!(text.contains("en -> fr"));
        assert!(text.trim_end().ends_with("End of machine-translated document."));
    }
}
