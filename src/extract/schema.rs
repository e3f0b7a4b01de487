//! Canonical applicant schema.
//!
//! `SchemaField::ALL` is the one ordered field list. Prompt text, labeled-line
//! patterns, sheet headers and column order are all derived from it, so adding
//! a field means adding a variant and its four descriptors below.

use serde::Serialize;

/// One named string attribute of the applicant record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaField {
    Name,
    MemberId,
    Age,
    Job,
    Experience,
    Address,
    Status,
    Certifications,
    Education,
    RequestedDates,
}

impl SchemaField {
    /// Every field, in column order.
    pub const ALL: [SchemaField; 10] = [
        SchemaField::Name,
        SchemaField::MemberId,
        SchemaField::Age,
        SchemaField::Job,
        SchemaField::Experience,
        SchemaField::Address,
        SchemaField::Status,
        SchemaField::Certifications,
        SchemaField::Education,
        SchemaField::RequestedDates,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// JSON key used in the extraction service's response object.
    pub fn key(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::MemberId => "member_id",
            Self::Age => "age",
            Self::Job => "job",
            Self::Experience => "experience",
            Self::Address => "address",
            Self::Status => "status",
            Self::Certifications => "cert",
            Self::Education => "education",
            Self::RequestedDates => "requested_dates",
        }
    }

    /// Label as it appears in the notification's `・<label>：<value>` lines.
    pub fn line_label(self) -> &'static str {
        match self {
            Self::Name => "氏名",
            Self::MemberId => "会員番号",
            Self::Age => "年齢",
            Self::Job => "職種",
            Self::Experience => "経験",
            Self::Address => "お住まい",
            Self::Status => "就業状況",
            Self::Certifications => "資格",
            Self::Education => "最終学歴",
            Self::RequestedDates => "希望日",
        }
    }

    /// Column header written to the sheet.
    pub fn header(self) -> &'static str {
        match self {
            Self::Name => "氏名",
            Self::MemberId => "会員番号",
            Self::Age => "年齢",
            Self::Job => "職種",
            Self::Experience => "経験",
            Self::Address => "住所",
            Self::Status => "就業状況",
            Self::Certifications => "資格",
            Self::Education => "最終学歴",
            Self::RequestedDates => "希望日",
        }
    }

    /// Meaning and normalization rule, as handed to the extraction service.
    pub fn description(self) -> &'static str {
        match self {
            Self::Name => {
                "applicant full name; strip honorific suffixes such as 先生, 様, さん and drop the reading in parentheses"
            }
            Self::MemberId => "member/registration number; digits only, remove every non-digit character",
            Self::Age => "age in years; digits only, remove 歳 and any other non-digit character",
            Self::Job => "job title or occupation applied for",
            Self::Experience => "experience summary, keep parenthetical content verbatim",
            Self::Address => "place of residence, keep parenthetical content verbatim",
            Self::Status => "current employment status",
            Self::Certifications => "certifications or licenses held",
            Self::Education => "highest education completed",
            Self::RequestedDates => "requested interview/visit dates, if any",
        }
    }

    /// Fields whose values are reduced to ASCII digits during normalization.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::MemberId | Self::Age)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Context columns derived outside the schema extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextField {
    SubmittedOn,
    Organization,
    Vendor,
    RoutingKey,
}

impl ContextField {
    /// Context columns, in the order they precede the schema columns.
    pub const ALL: [ContextField; 4] = [
        ContextField::SubmittedOn,
        ContextField::Organization,
        ContextField::Vendor,
        ContextField::RoutingKey,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Self::SubmittedOn => "応募日",
            Self::Organization => "医院名",
            Self::Vendor => "媒体",
            Self::RoutingKey => "チャンネルID",
        }
    }
}

/// Full header row: context columns first, then schema columns.
pub fn header_row() -> Vec<String> {
    ContextField::ALL
        .iter()
        .map(|f| f.header().to_string())
        .chain(SchemaField::ALL.iter().map(|f| f.header().to_string()))
        .collect()
}

/// Total column count of a data row.
pub fn column_count() -> usize {
    ContextField::ALL.len() + SchemaField::COUNT
}

// ── Extracted record ────────────────────────────────────────────────

/// Mapping from every schema field to a string value (`""` = unknown).
///
/// There is no partial constructor: a record always carries every field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRecord {
    values: [String; SchemaField::COUNT],
}

impl ExtractedRecord {
    /// All fields empty.
    pub fn empty() -> Self {
        Self::from_fn(|_| String::new())
    }

    /// Build a record by asking `f` for every field in schema order.
    pub fn from_fn<F>(mut f: F) -> Self
    where
        F: FnMut(SchemaField) -> String,
    {
        Self {
            values: SchemaField::ALL.map(&mut f),
        }
    }

    pub fn get(&self, field: SchemaField) -> &str {
        &self.values[field.index()]
    }

    pub fn set(&mut self, field: SchemaField, value: impl Into<String>) {
        self.values[field.index()] = value.into();
    }

    /// Builder-style `set`.
    pub fn with(mut self, field: SchemaField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// `(field, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (SchemaField, &str)> {
        SchemaField::ALL
            .iter()
            .map(move |&f| (f, self.values[f.index()].as_str()))
    }

    /// True when every field is empty.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| v.is_empty())
    }

    /// A record is worth writing only when it identifies the applicant.
    pub fn has_signal(&self) -> bool {
        !self.get(SchemaField::Name).is_empty() || !self.get(SchemaField::MemberId).is_empty()
    }
}

impl Default for ExtractedRecord {
    fn default() -> Self {
        Self::empty()
    }
}
