/*!
 * Tests for configuration loading
 */

use anyhow::Result;
use pdfdual::app_config::{Config, DEFAULT_CONFIG_PATH};
use pdfdual::pipeline::WatermarkMode;

use crate::common;

#[test]
fn test_fromFile_withMissingFile_shouldHintAtCreateConfig() {
    let error = Config::from_file("does/not/exist.json").unwrap_err();
    assert!(error.to_string().contains("--create-config"));
}

#[test]
fn test_example_savedAndLoaded_shouldRequireRealApiKey() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join(DEFAULT_CONFIG_PATH);
    std::fs::create_dir_all(path.parent().unwrap())?;

    Config::example().save(&path)?;
    let loaded = Config::from_file(&path)?;

    let error = loaded.validate().unwrap_err();
    assert!(error.to_string().contains("API key is required"));
    Ok(())
}

#[test]
fn test_fromFile_withPartialJson_shouldFillDefaultsAndBuildPipelineConfig() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "config.json",
        r#"{
            "target_language": "de",
            "translation": { "openai_api_key": "sk-live", "qps": 2 },
            "pdf": { "pages": "2-4, 9-", "max_pages_per_part": 2, "watermark_output_mode": "both", "no_dual": true }
        }"#,
    )?;

    let config = Config::from_file(&path)?;
    config.validate()?;
    let pipeline = config.pipeline_config()?;

    assert_eq!(config.source_language, "en");
    assert_eq!(pipeline.dispatch.qps, 2);
    assert_eq!(pipeline.dispatch.target_language, "de");
    assert_eq!(pipeline.max_pages_per_part, Some(2));
    assert_eq!(pipeline.pages.as_ref().map(|p| p.expression().to_string()), Some("2-4, 9-".to_string()));
    assert!(!pipeline.output.dual && pipeline.output.mono);
    assert_eq!(pipeline.output.watermark_mode, WatermarkMode::Both);
    assert!(pipeline.dispatch.system_prompt.contains("German"));
    Ok(())
}

#[test]
fn test_fromFile_withMalformedJson_shouldNamePath() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(temp_dir.path(), "broken.json", "{ \"qps\": ")?;

    let error = Config::from_file(&path).unwrap_err();
    assert!(format!("{:#}", error).contains("broken.json"));
    Ok(())
}
