/*!
 * Document segmentation.
 *
 * Turns a page-range expression such as `"1,2,1-,-3,3-5"` into a set of
 * selected pages, then partitions the selected pages (and the units on
 * them) into `Part`s of at most `max_pages_per_part` pages.
 */

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::document::TranslationUnit;
use crate::errors::PipelineError;

/// One comma-separated token of a page-range expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageRange {
    /// `N`
    Single(usize),
    /// `N-M`
    Closed(usize, usize),
    /// `N-` (from N to the last page)
    From(usize),
    /// `-N` (from the first page to N)
    UpTo(usize),
}

/// Parsed page-range expression.
///
/// Parsing checks the grammar only; page bounds are checked by
/// [`PageSelector::resolve`] once the page count is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelector {
    expression: String,
    ranges: Vec<(String, PageRange)>,
}

fn parse_page_number(token: &str, raw: &str) -> Result<usize, PipelineError> {
    let value = raw.trim();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(PipelineError::invalid_range(token, format!("'{}' is not a page number", value)));
    }
    let page: usize = value
        .parse()
        .map_err(|_| PipelineError::invalid_range(token, "page number is too large"))?;
    if page == 0 {
        return Err(PipelineError::invalid_range(token, "pages are numbered from 1"));
    }
    Ok(page)
}

fn parse_token(token: &str) -> Result<PageRange, PipelineError> {
    if token.is_empty() {
        return Err(PipelineError::invalid_range(token, "empty token"));
    }

    match token.split_once('-') {
        None => Ok(PageRange::Single(parse_page_number(token, token)?)),
        Some((start, end)) => {
            let (start, end) = (start.trim(), end.trim());
            match (start.is_empty(), end.is_empty()) {
                (true, true) => Err(PipelineError::invalid_range(token, "range has no bounds")),
                (false, true) => Ok(PageRange::From(parse_page_number(token, start)?)),
                (true, false) => Ok(PageRange::UpTo(parse_page_number(token, end)?)),
                (false, false) => {
                    let first = parse_page_number(token, start)?;
                    let last = parse_page_number(token, end)?;
                    if first > last {
                        return Err(PipelineError::invalid_range(
                            token,
                            format!("range start {} is after range end {}", first, last),
                        ));
                    }
                    Ok(PageRange::Closed(first, last))
                }
            }
        }
    }
}

impl PageSelector {
    /// Parse a page-range expression. Tokens are separated by commas and may
    /// be surrounded by whitespace.
    pub fn parse(expression: &str) -> Result<Self, PipelineError> {
        let ranges = expression
            .split(',')
            .map(|raw| {
                let token = raw.trim();
                parse_token(token).map(|range| (token.to_string(), range))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            expression: expression.trim().to_string(),
            ranges,
        })
    }

    /// Selector matching every page
    pub fn all() -> Self {
        Self {
            expression: "1-".to_string(),
            ranges: vec![("1-".to_string(), PageRange::From(1))],
        }
    }

    /// The expression as written
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Resolve the selector against a document of `page_count` pages.
    ///
    /// Explicit page numbers beyond the last page are rejected; an open
    /// range starting beyond the last page is rejected as well.
    pub fn resolve(&self, page_count: usize) -> Result<BTreeSet<usize>, PipelineError> {
        let beyond = |token: &str, page: usize| {
            PipelineError::invalid_range(
                token,
                format!("page {} is beyond the last page ({})", page, page_count),
            )
        };

        let mut pages = BTreeSet::new();
        for (token, range) in &self.ranges {
            let (first, last) = match *range {
                PageRange::Single(page) => (page, page),
                PageRange::Closed(first, last) => (first, last),
                PageRange::From(first) => (first, page_count),
                PageRange::UpTo(last) => (1, last),
            };
            let explicit_end = !matches!(range, PageRange::From(_));
            if first > page_count {
                return Err(beyond(token, first));
            }
            if explicit_end && last > page_count {
                return Err(beyond(token, last));
            }
            pages.extend(first..=last);
        }
        Ok(pages)
    }
}

impl FromStr for PageSelector {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PageSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// An ordered batch of units over a run of consecutive selected pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// 0-based position of the part in the run
    pub index: usize,
    /// Selected pages covered by this part, ascending
    pub pages: Vec<usize>,
    /// Units on those pages, in reading order
    pub units: Vec<TranslationUnit>,
}

impl Part {
    pub fn first_page(&self) -> usize {
        self.pages.first().copied().unwrap_or(0)
    }

    pub fn last_page(&self) -> usize {
        self.pages.last().copied().unwrap_or(0)
    }
}

/// Split the selected pages into parts.
///
/// `max_pages_per_part` of `None` or `<= 0` yields a single part holding
/// every selected page. Units on pages that were not selected are dropped.
/// Pure: performs no I/O.
pub fn segment(
    units: &[TranslationUnit],
    page_count: usize,
    selector: Option<&PageSelector>,
    max_pages_per_part: Option<i64>,
) -> Result<Vec<Part>, PipelineError> {
    let selected: Vec<usize> = match selector {
        Some(selector) => selector.resolve(page_count)?.into_iter().collect(),
        None => (1..=page_count).collect(),
    };

    if selected.is_empty() {
        return Ok(Vec::new());
    }

    let chunk_size = match max_pages_per_part {
        Some(max) if max > 0 => max as usize,
        _ => selected.len(),
    };

    let mut units_by_order: Vec<&TranslationUnit> = units.iter().collect();
    units_by_order.sort_by_key(|u| u.order());

    let parts = selected
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, pages)| {
            let part_units = units_by_order
                .iter()
                .filter(|u| pages.binary_search(&u.page()).is_ok())
                .map(|u| (*u).clone())
                .collect();
            Part {
                index,
                pages: pages.to_vec(),
                units: part_units,
            }
        })
        .collect();

    Ok(parts)
}
