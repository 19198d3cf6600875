//! Typed request parameters parsed from untrusted query strings
//!
//! Parsing never stops at the first bad field: every problem is recorded in
//! [`FieldErrors`] so a client sees all of them in one response.

use crate::error::FieldErrors;
use crate::Result;
use serde::Serialize;
use std::collections::HashMap;

/// Query string as received
///
/// Every value of a repeated key is kept so the repetition can be rejected
/// instead of silently picking one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawParams {
    values: HashMap<String, Vec<String>>,
}

impl RawParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.entry(name.into()).or_default().push(value.into());
    }

    /// All values given for `name`, in request order
    pub fn get_all(&self, name: &str) -> &[String] {
        self.values.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

impl FromIterator<(String, String)> for RawParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// Collects typed values and validation messages from a [`RawParams`]
struct ParamReader<'a> {
    raw: &'a RawParams,
    errors: FieldErrors,
}

impl<'a> ParamReader<'a> {
    fn new(raw: &'a RawParams) -> Self {
        Self {
            raw,
            errors: FieldErrors::new(),
        }
    }

    /// The single value of `name`; a repeated key is an error
    fn value(&mut self, name: &str) -> Option<&'a str> {
        let raw: &'a RawParams = self.raw;
        match raw.get_all(name) {
            [] => None,
            [value] => Some(value.as_str()),
            values => {
                self.errors.add(
                    name,
                    format!("expected a single value, received {}", values.len()),
                );
                None
            }
        }
    }

    /// Non-empty string, taken verbatim
    fn required_string(&mut self, name: &str) -> String {
        if !self.raw.contains(name) {
            self.errors.add(name, "Required");
            return String::new();
        }
        match self.value(name) {
            None => String::new(),
            Some("") => {
                self.errors.add(name, "must not be empty");
                String::new()
            }
            Some(v) => v.to_string(),
        }
    }

    /// Any string, taken verbatim
    fn optional_string(&mut self, name: &str) -> Option<String> {
        self.value(name).map(String::from)
    }

    /// Trimmed string that must be non-empty when present
    fn optional_trimmed(&mut self, name: &str) -> Option<String> {
        let value = self.value(name)?.trim();
        if value.is_empty() {
            self.errors.add(name, "must not be empty");
            return None;
        }
        Some(value.to_string())
    }

    /// A blank value is not coerced to zero
    fn optional_integer(&mut self, name: &str) -> Option<i64> {
        let raw = self.value(name)?;
        match parse_integer(raw) {
            Some(n) => Some(n),
            None => {
                self.errors
                    .add(name, format!("expected an integer, received '{raw}'"));
                None
            }
        }
    }

    /// Integer within `[min, max]`, or `default` when absent
    fn bounded(&mut self, name: &str, default: usize, min: usize, max: Option<usize>) -> usize {
        let Some(n) = self.optional_integer(name) else {
            return default;
        };
        if n < min as i64 {
            self.errors.add(name, format!("must be at least {min}"));
            return default;
        }
        let Ok(n) = usize::try_from(n) else {
            self.errors.add(name, "is out of range");
            return default;
        };
        if let Some(max) = max {
            if n > max {
                self.errors.add(name, format!("must be at most {max}"));
                return default;
            }
        }
        n
    }

    fn boolean(&mut self, name: &str, default: bool) -> bool {
        let Some(raw) = self.value(name) else {
            return default;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => {
                self.errors
                    .add(name, format!("expected 'true' or 'false', received '{raw}'"));
                default
            }
        }
    }

    fn finish<T>(self, value: T) -> Result<T> {
        self.errors.into_result(value)
    }
}

/// Accepts decimal integers and integral decimals such as `"5.0"` or `"1e2"`.
fn parse_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(n);
    }
    let f: f64 = trimmed.parse().ok()?;
    // 2^53: beyond this f64 no longer represents every integer
    if f.is_finite() && f.fract() == 0.0 && f.abs() <= 9_007_199_254_740_992.0 {
        Some(f as i64)
    } else {
        None
    }
}

/// Parameters of the free-text `/search` endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequestParams {
    pub index: String,
    /// Free-text term, `q`
    pub free_text: Option<String>,
    /// `from`
    pub offset: usize,
    /// `size`
    pub limit: usize,
}

impl SearchRequestParams {
    pub const DEFAULT_LIMIT: usize = 10;
    pub const MAX_LIMIT: usize = 100;

    pub fn parse(raw: &RawParams) -> Result<Self> {
        let mut reader = ParamReader::new(raw);
        let index = reader.required_string("index");
        let free_text = reader.optional_string("q");
        let offset = reader.bounded("from", 0, 0, None);
        let limit = reader.bounded("size", Self::DEFAULT_LIMIT, 1, Some(Self::MAX_LIMIT));

        reader.finish(Self {
            index,
            free_text,
            offset,
            limit,
        })
    }
}

/// Exact-match filters on record attributes
///
/// Serialized with the query parameter names so it can be echoed back in
/// response metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordFilterParams {
    #[serde(rename = "stdno")]
    pub student_id: Option<String>,
    pub year: Option<i64>,
    #[serde(rename = "smt")]
    pub semester_code: Option<String>,
    #[serde(rename = "inpart")]
    pub installment_part: Option<String>,
}

impl RecordFilterParams {
    fn read(reader: &mut ParamReader<'_>) -> Self {
        Self {
            student_id: reader.optional_trimmed("stdno"),
            year: reader.optional_integer("year"),
            semester_code: reader.optional_trimmed("smt"),
            installment_part: reader.optional_trimmed("inpart"),
        }
    }

    pub fn parse(raw: &RawParams) -> Result<Self> {
        let mut reader = ParamReader::new(raw);
        let filters = Self::read(&mut reader);
        reader.finish(filters)
    }

    pub fn is_empty(&self) -> bool {
        self.student_id.is_none()
            && self.year.is_none()
            && self.semester_code.is_none()
            && self.installment_part.is_none()
    }
}

/// Parameters of the `/records` and `/records/query` endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQueryParams {
    pub size: usize,
    pub filters: RecordFilterParams,
}

impl ListQueryParams {
    pub const DEFAULT_SIZE: usize = 1000;
    pub const MAX_SIZE: usize = 10_000;

    /// `filtered = false` reads only `size`; filter parameters are then ignored.
    pub fn parse(raw: &RawParams, filtered: bool) -> Result<Self> {
        let mut reader = ParamReader::new(raw);
        let size = reader.bounded("size", Self::DEFAULT_SIZE, 1, Some(Self::MAX_SIZE));
        let filters = if filtered {
            RecordFilterParams::read(&mut reader)
        } else {
            RecordFilterParams::default()
        };
        reader.finish(Self { size, filters })
    }
}

/// Parameters of the paginated `/records/custom-response` endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQueryParams {
    pub page: usize,
    /// Page size, `size`
    pub size: usize,
    /// Raw `field:direction`; validated when the descriptor is built
    pub sort: Option<String>,
    pub source_only: bool,
    /// `includeRaw`
    pub include_raw: bool,
    pub filters: RecordFilterParams,
}

impl Default for PageQueryParams {
    fn default() -> Self {
        Self {
            page: 1,
            size: Self::DEFAULT_SIZE,
            sort: None,
            source_only: true,
            include_raw: false,
            filters: RecordFilterParams::default(),
        }
    }
}

impl PageQueryParams {
    pub const DEFAULT_SIZE: usize = 50;
    pub const MAX_SIZE: usize = 1000;

    pub fn parse(raw: &RawParams) -> Result<Self> {
        let mut reader = ParamReader::new(raw);
        let page = reader.bounded("page", 1, 1, None);
        let size = reader.bounded("size", Self::DEFAULT_SIZE, 1, Some(Self::MAX_SIZE));
        let sort = reader.optional_string("sort").filter(|s| !s.is_empty());
        let source_only = reader.boolean("sourceOnly", true);
        let include_raw = reader.boolean("includeRaw", false);
        let filters = RecordFilterParams::read(&mut reader);

        reader.finish(Self {
            page,
            size,
            sort,
            source_only,
            include_raw,
            filters,
        })
    }

    /// Offset of the first hit on this page; `None` on overflow
    pub fn offset(&self) -> Option<usize> {
        self.page.checked_sub(1)?.checked_mul(self.size)
    }
}

/// Parameters of the `/records/stats` endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsQueryParams {
    pub student_id: Option<String>,
    pub year: Option<i64>,
    pub top_n: usize,
}

impl Default for StatsQueryParams {
    fn default() -> Self {
        Self {
            student_id: None,
            year: None,
            top_n: Self::DEFAULT_TOP_N,
        }
    }
}

impl StatsQueryParams {
    pub const DEFAULT_TOP_N: usize = 10;
    pub const MAX_TOP_N: usize = 50;

    pub fn parse(raw: &RawParams) -> Result<Self> {
        let mut reader = ParamReader::new(raw);
        let student_id = reader.optional_trimmed("stdno");
        let year = reader.optional_integer("year");
        let top_n = reader.bounded("topN", Self::DEFAULT_TOP_N, 1, Some(Self::MAX_TOP_N));

        reader.finish(Self {
            student_id,
            year,
            top_n,
        })
    }

    pub fn filters(&self) -> RecordFilterParams {
        RecordFilterParams {
            student_id: self.student_id.clone(),
            year: self.year,
            ..RecordFilterParams::default()
        }
    }
}
