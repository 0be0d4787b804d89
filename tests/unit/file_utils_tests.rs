/*!
 * Tests for file utility functions
 */

use anyhow::Result;
use std::fs;
use std::path::Path;
use pdfdual::file_utils::FileManager;

use crate::common;

/// Test that file_exists returns true for existing files
#[test]
fn test_fileExists_withExistingFile_shouldReturnTrue() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let test_file = common::create_test_file(temp_dir.path(), "present.json", "{}")?;

    assert!(FileManager::file_exists(&test_file));
    assert!(!FileManager::file_exists(temp_dir.path()));
    assert!(!FileManager::file_exists(temp_dir.path().join("absent.json")));
    Ok(())
}

#[test]
fn test_findExtractedDocuments_withNestedFolders_shouldReturnSortedInputsOnly() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let nested = temp_dir.path().join("volume2");
    fs::create_dir_all(&nested)?;

    common::create_test_file(temp_dir.path(), "b.json", "{}")?;
    common::create_test_file(temp_dir.path(), "a.json", "{}")?;
    common::create_test_file(temp_dir.path(), "a.fr.result.json", "{}")?;
    common::create_test_file(temp_dir.path(), "a.fr.glossary.json", "{}")?;
    common::create_test_file(temp_dir.path(), "a.fr.mono.txt", "")?;
    common::create_test_file(&nested, "c.JSON", "{}")?;

    let found = FileManager::find_extracted_documents(temp_dir.path())?;
    let names: Vec<String> = found
        .iter()
        .map(|p| p.strip_prefix(temp_dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();

    assert_eq!(names, vec!["a.json", "b.json", "volume2/c.JSON"]);
    Ok(())
}

#[test]
fn test_generateOutputPath_withNoWatermarkStem_shouldKeepMarker() {
    let path = FileManager::generate_output_path("paper.no_watermark", Path::new("/out"), "zh", "dual.txt");
    assert_eq!(path, Path::new("/out/paper.no_watermark.zh.dual.txt"));
}
