/*!
 * Tests for loading extracted documents
 */

use anyhow::Result;
use std::path::Path;
use pdfdual::ExtractedDocument;

use crate::common;

#[test]
fn test_load_withoutSource_shouldUseFilePath() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "report.json",
        r#"{ "page_count": 3, "blocks": [
            { "page": 3, "anchor": "b1", "text": "Conclusion" },
            { "page": 1, "anchor": "b1", "text": "Introduction" }
        ] }"#,
    )?;

    let document = ExtractedDocument::load(&path)?;

    assert_eq!(document.source, path);
    assert_eq!(document.page_count, 3);
    let units = document.units();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].text(), "Conclusion");
    assert_eq!(units[1].page(), 1);
    Ok(())
}

#[test]
fn test_load_withBlockBeyondLastPage_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "bad.json",
        r#"{ "source": "bad.pdf", "page_count": 1, "blocks": [ { "page": 2, "anchor": "b1", "text": "x" } ] }"#,
    )?;

    let error = ExtractedDocument::load(&path).unwrap_err();
    assert!(error.to_string().contains("page 2"));
    Ok(())
}

#[test]
fn test_contentHash_withSameBlocks_shouldNotDependOnSourcePath() {
    let a = common::sample_document("a.pdf", 2, 1);
    let mut b = a.clone();
    b.source = Path::new("elsewhere/b.pdf").to_path_buf();

    assert_eq!(a.content_hash(), b.content_hash());
}
