/*!
 * Tests for page selection and splitting into parts
 */

use pdfdual::PipelineError;
use pdfdual::pipeline::{PageSelector, segment};

use crate::common;

#[test]
fn test_segment_forEveryPartSize_shouldCoverSelectionInOrder() {
    let document = common::sample_document("book.pdf", 9, 2);
    let units = document.units();
    let selector = PageSelector::parse("1,2,1-,-3,3-5").unwrap();

    for max in 1..=10 {
        let parts = segment(&units, document.page_count, Some(&selector), Some(max)).unwrap();

        let pages: Vec<usize> = parts.iter().flat_map(|p| p.pages.clone()).collect();
        assert_eq!(pages, (1..=9).collect::<Vec<_>>(), "max {}", max);
        assert!(parts.iter().all(|p| p.pages.len() <= max as usize));
        assert_eq!(parts.iter().map(|p| p.units.len()).sum::<usize>(), 18);

        for (index, part) in parts.iter().enumerate() {
            assert_eq!(part.index, index);
            assert!(part.units.iter().all(|u| part.pages.contains(&u.page())));
            assert!(part.units.windows(2).all(|w| w[0].order() < w[1].order()));
        }
    }
}

#[test]
fn test_segment_withSparseSelection_shouldDropOtherPages() {
    let document = common::sample_document("book.pdf", 6, 1);
    let selector = PageSelector::parse("2, 5-").unwrap();

    let parts = segment(&document.units(), document.page_count, Some(&selector), Some(2)).unwrap();

    let pages: Vec<Vec<usize>> = parts.iter().map(|p| p.pages.clone()).collect();
    assert_eq!(pages, vec![vec![2, 5], vec![6]]);
    assert_eq!(parts[0].units[1].text(), "Paragraph 1 of page 5");
}

#[test]
fn test_segment_withPageBeyondEnd_shouldFailWithInvalidRange() {
    let document = common::sample_document("book.pdf", 4, 1);
    let selector = PageSelector::parse("3-6").unwrap();

    let error = segment(&document.units(), document.page_count, Some(&selector), None).unwrap_err();
    assert!(matches!(error, PipelineError::InvalidRange { ref token, .. } if token == "3-6"));
}
