//! Domain models for Tally
//!
//! Read models mirror table rows one-to-one. `New*` structs are the insert
//! shapes; each has a `validate()` that the storage layer calls before any
//! SQL runs, so invalid values never reach the store.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Currency applied when an extracted line does not name one
pub const DEFAULT_CURRENCY: &str = "THB";

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"))
}

fn currency_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{3}$").expect("valid currency regex"))
}

fn sha256_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-f]{64}$").expect("valid hash regex"))
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::domain(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn check_period(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        return Err(Error::domain(format!(
            "period start {} is after period end {}",
            start, end
        )));
    }
    Ok(())
}

// ========== Closed enums ==========

/// Role of an application user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Accountant,
    #[default]
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Accountant => "accountant",
            Self::User => "user",
        }
    }
}

impl FromStr for UserRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "accountant" => Ok(Self::Accountant),
            "user" => Ok(Self::User),
            _ => Err(Error::domain(format!("Unknown user role: {}", s))),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of ingested file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadType {
    BankStatement,
    Receipt,
    Other,
}

impl UploadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankStatement => "bank_statement",
            Self::Receipt => "receipt",
            Self::Other => "other",
        }
    }
}

impl FromStr for UploadType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bank_statement" | "statement" => Ok(Self::BankStatement),
            "receipt" => Ok(Self::Receipt),
            "other" => Ok(Self::Other),
            _ => Err(Error::domain(format!("Unknown upload type: {}", s))),
        }
    }
}

impl std::fmt::Display for UploadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Processing state of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    #[default]
    Uploaded,
    Processing,
    Processed,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    /// uploaded -> processing -> processed | failed, and failed -> processing for retries
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        matches!(
            (self, next),
            (Self::Uploaded, Self::Processing)
                | (Self::Processing, Self::Processed)
                | (Self::Processing, Self::Failed)
                | (Self::Failed, Self::Processing)
        )
    }
}

impl FromStr for UploadStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "uploaded" => Ok(Self::Uploaded),
            "processing" => Ok(Self::Processing),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            _ => Err(Error::domain(format!("Unknown upload status: {}", s))),
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Accounting class of a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    Income,
    Expense,
    Cogs,
    Asset,
    Liability,
    Equity,
    Tax,
}

impl CategoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Cogs => "cogs",
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Equity => "equity",
            Self::Tax => "tax",
        }
    }

    pub fn all() -> &'static [CategoryType] {
        &[
            Self::Income,
            Self::Expense,
            Self::Cogs,
            Self::Asset,
            Self::Liability,
            Self::Equity,
            Self::Tax,
        ]
    }
}

impl FromStr for CategoryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "cogs" => Ok(Self::Cogs),
            "asset" => Ok(Self::Asset),
            "liability" => Ok(Self::Liability),
            "equity" => Ok(Self::Equity),
            "tax" => Ok(Self::Tax),
            _ => Err(Error::domain(format!("Unknown category type: {}", s))),
        }
    }
}

impl std::fmt::Display for CategoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a classification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Manual,
    Ai,
    Rule,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Ai => "ai",
            Self::Rule => "rule",
        }
    }
}

impl FromStr for ClassificationSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "ai" => Ok(Self::Ai),
            "rule" => Ok(Self::Rule),
            _ => Err(Error::domain(format!("Unknown classification source: {}", s))),
        }
    }
}

impl std::fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Matching strategy label recorded on a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStrategy {
    ExactAmountDate,
    Fuzzy,
    Manual,
    Hybrid,
}

impl RunStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactAmountDate => "exact_amount_date",
            Self::Fuzzy => "fuzzy",
            Self::Manual => "manual",
            Self::Hybrid => "hybrid",
        }
    }
}

impl FromStr for RunStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "exact_amount_date" | "exact" => Ok(Self::ExactAmountDate),
            "fuzzy" => Ok(Self::Fuzzy),
            "manual" => Ok(Self::Manual),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(Error::domain(format!("Unknown reconciliation strategy: {}", s))),
        }
    }
}

impl std::fmt::Display for RunStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(Error::domain(format!("Unknown run status: {}", s))),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-transaction outcome within a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Matched,
    Unmatched,
    /// Several candidate receipts, or a partial amount match
    Ambiguous,
    Ignored,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::Unmatched => "unmatched",
            Self::Ambiguous => "ambiguous",
            Self::Ignored => "ignored",
        }
    }
}

impl FromStr for MatchStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "matched" => Ok(Self::Matched),
            "unmatched" => Ok(Self::Unmatched),
            "ambiguous" | "partial" => Ok(Self::Ambiguous),
            "ignored" => Ok(Self::Ignored),
            _ => Err(Error::domain(format!("Unknown match status: {}", s))),
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of report snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Summary,
    Pnl,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Pnl => "pnl",
        }
    }
}

impl FromStr for ReportType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(Self::Summary),
            "pnl" | "p&l" => Ok(Self::Pnl),
            _ => Err(Error::domain(format!("Unknown report type: {}", s))),
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ========== Validated values ==========

/// Signed money amount with exactly two decimal places
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const SCALE: u32 = 2;

    /// Rejects values with more than two significant fractional digits.
    /// Values with fewer are padded, so `12.5` is stored as `12.50`.
    pub fn new(value: Decimal) -> Result<Self> {
        let normalized = value.normalize();
        if normalized.scale() > Self::SCALE {
            return Err(Error::domain(format!(
                "amount {} has more than {} decimal places",
                value,
                Self::SCALE
            )));
        }
        let mut scaled = normalized;
        scaled.rescale(Self::SCALE);
        // rescale leaves the scale short when the mantissa has no room left
        if scaled.scale() != Self::SCALE {
            return Err(Error::domain(format!(
                "amount {} is too large to carry {} decimal places",
                value,
                Self::SCALE
            )));
        }
        Ok(Self(scaled))
    }

    pub fn from_minor_units(units: i64) -> Self {
        Self(Decimal::new(units, Self::SCALE))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = Error;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| Error::domain(format!("Invalid amount '{}': {}", s, e)))?;
        Self::new(value)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Score in [0, 1] with at most four decimal places
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Confidence(Decimal);

impl Confidence {
    pub const SCALE: u32 = 4;

    pub fn new(value: Decimal) -> Result<Self> {
        if value < Decimal::ZERO || value > Decimal::ONE {
            return Err(Error::domain(format!(
                "confidence {} is outside [0, 1]",
                value
            )));
        }
        let normalized = value.normalize();
        if normalized.scale() > Self::SCALE {
            return Err(Error::domain(format!(
                "confidence {} has more than {} decimal places",
                value,
                Self::SCALE
            )));
        }
        let mut scaled = normalized;
        scaled.rescale(Self::SCALE);
        Ok(Self(scaled))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Confidence {
    type Error = Error;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Confidence> for Decimal {
    fn from(confidence: Confidence) -> Self {
        confidence.0
    }
}

impl FromStr for Confidence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| Error::domain(format!("Invalid confidence '{}': {}", s, e)))?;
        Self::new(value)
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of tax labels attached to a classification (e.g. `vat7`, `wht3`)
///
/// Labels are trimmed and kept sorted, so the stored JSON is stable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct TaxTags(BTreeSet<String>);

impl TaxTags {
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for label in labels {
            let label = label.as_ref().trim();
            require_non_empty("tax tag", label)?;
            set.insert(label.to_string());
        }
        Ok(Self(set))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let labels: Vec<String> = serde_json::from_str(json)?;
        Self::new(labels)
    }
}

impl TryFrom<Vec<String>> for TaxTags {
    type Error = Error;

    fn try_from(labels: Vec<String>) -> Result<Self> {
        Self::new(labels)
    }
}

impl From<TaxTags> for Vec<String> {
    fn from(tags: TaxTags) -> Self {
        tags.0.into_iter().collect()
    }
}

// ========== Users ==========

/// An application user (accountant, admin, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
}

impl NewUser {
    pub fn new(email: &str, full_name: &str, role: UserRole) -> Result<Self> {
        let user = Self {
            email: email.trim().to_lowercase(),
            full_name: full_name.trim().to_string(),
            role,
        };
        user.validate()?;
        Ok(user)
    }

    pub fn validate(&self) -> Result<()> {
        if !email_re().is_match(&self.email) {
            return Err(Error::domain(format!("Invalid email: {}", self.email)));
        }
        require_non_empty("full_name", &self.full_name)
    }
}

// ========== Uploads ==========

/// One ingested source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    pub id: i64,
    pub upload_type: UploadType,
    pub original_filename: String,
    pub stored_filename: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    /// SHA256 of the file content
    pub content_hash: Option<String>,
    pub uploaded_by: Option<i64>,
    pub statement_period_start: Option<NaiveDate>,
    pub statement_period_end: Option<NaiveDate>,
    pub status: UploadStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUpload {
    pub upload_type: UploadType,
    pub original_filename: String,
    pub stored_filename: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub content_hash: Option<String>,
    pub uploaded_by: Option<i64>,
    pub statement_period_start: Option<NaiveDate>,
    pub statement_period_end: Option<NaiveDate>,
}

impl NewUpload {
    pub fn new(upload_type: UploadType, original_filename: &str) -> Self {
        Self {
            upload_type,
            original_filename: original_filename.to_string(),
            stored_filename: None,
            mime_type: None,
            size_bytes: None,
            content_hash: None,
            uploaded_by: None,
            statement_period_start: None,
            statement_period_end: None,
        }
    }

    /// Fill size and content hash from the raw file bytes
    pub fn with_content(mut self, bytes: &[u8]) -> Self {
        self.size_bytes = Some(bytes.len() as i64);
        self.content_hash = Some(content_hash(bytes));
        self
    }

    pub fn with_period(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.statement_period_start = Some(start);
        self.statement_period_end = Some(end);
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("original_filename", &self.original_filename)?;
        if let Some(size) = self.size_bytes {
            if size < 0 {
                return Err(Error::domain(format!("size_bytes must be >= 0, got {}", size)));
            }
        }
        if let Some(ref hash) = self.content_hash {
            if !sha256_re().is_match(hash) {
                return Err(Error::domain(format!(
                    "content_hash must be 64 lowercase hex chars: {}",
                    hash
                )));
            }
        }
        if let (Some(start), Some(end)) = (self.statement_period_start, self.statement_period_end)
        {
            check_period(start, end)?;
        }
        Ok(())
    }
}

/// SHA256 hex digest used as an upload's content hash
pub fn content_hash(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(bytes))
}

// ========== Categories ==========

/// A node of the Thai chart of accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub code: String,
    pub name_th: String,
    pub name_en: Option<String>,
    pub category_type: CategoryType,
    pub parent_id: Option<i64>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// English name when present, Thai otherwise
    pub fn display_name(&self) -> &str {
        self.name_en.as_deref().unwrap_or(&self.name_th)
    }
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub code: String,
    pub name_th: String,
    pub name_en: Option<String>,
    pub category_type: CategoryType,
    pub parent_id: Option<i64>,
    pub description: Option<String>,
}

impl NewCategory {
    pub fn new(code: &str, name_th: &str, category_type: CategoryType) -> Self {
        Self {
            code: code.trim().to_string(),
            name_th: name_th.trim().to_string(),
            name_en: None,
            category_type,
            parent_id: None,
            description: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("code", &self.code)?;
        require_non_empty("name_th", &self.name_th)
    }
}

// ========== Vendors ==========

/// A commercial counterparty with an optional default category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: i64,
    pub name: String,
    pub default_category_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVendor {
    pub name: String,
    pub default_category_id: Option<i64>,
}

impl NewVendor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            default_category_id: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("vendor name", &self.name)
    }
}

// ========== Transactions ==========

/// One extracted financial line item, owned by its upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub source_upload_id: i64,
    pub txn_date: NaiveDate,
    pub posted_at: Option<DateTime<Utc>>,
    /// Negative = money out, positive = money in
    pub amount: Amount,
    pub currency: String,
    pub description: String,
    pub counterparty: Option<String>,
    pub account_ref: Option<String>,
    pub reference: Option<String>,
    /// Source text the line was extracted from
    pub raw_text: Option<String>,
    pub normalized_description: Option<String>,
    pub normalized_counterparty: Option<String>,
    pub normalized_account: Option<String>,
    pub normalized_memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub source_upload_id: i64,
    pub txn_date: NaiveDate,
    pub posted_at: Option<DateTime<Utc>>,
    pub amount: Amount,
    pub currency: String,
    pub description: String,
    pub counterparty: Option<String>,
    pub account_ref: Option<String>,
    pub reference: Option<String>,
    pub raw_text: Option<String>,
    pub normalized_description: Option<String>,
    pub normalized_counterparty: Option<String>,
    pub normalized_account: Option<String>,
    pub normalized_memo: Option<String>,
}

impl NewTransaction {
    pub fn new(source_upload_id: i64, txn_date: NaiveDate, amount: Amount, description: &str) -> Self {
        Self {
            source_upload_id,
            txn_date,
            posted_at: None,
            amount,
            currency: DEFAULT_CURRENCY.to_string(),
            description: description.to_string(),
            counterparty: None,
            account_ref: None,
            reference: None,
            raw_text: None,
            normalized_description: None,
            normalized_counterparty: None,
            normalized_account: None,
            normalized_memo: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("description", &self.description)?;
        if !currency_re().is_match(&self.currency) {
            return Err(Error::domain(format!(
                "currency must be a three-letter uppercase code: {}",
                self.currency
            )));
        }
        Ok(())
    }
}

// ========== Classifications ==========

/// Categorization applied to exactly one transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub id: i64,
    pub transaction_id: i64,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub tax_tags: TaxTags,
    /// Unknown for manual classifications
    pub confidence: Option<Confidence>,
    pub is_override: bool,
    pub overridden_by: Option<i64>,
    pub source: ClassificationSource,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewClassification {
    pub transaction_id: i64,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub tax_tags: TaxTags,
    pub confidence: Option<Confidence>,
    pub is_override: bool,
    pub overridden_by: Option<i64>,
    pub source: ClassificationSource,
    pub notes: Option<String>,
}

impl NewClassification {
    pub fn new(transaction_id: i64, source: ClassificationSource) -> Self {
        Self {
            transaction_id,
            category_id: None,
            subcategory_id: None,
            vendor_id: None,
            tax_tags: TaxTags::default(),
            confidence: None,
            is_override: false,
            overridden_by: None,
            source,
            notes: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.overridden_by.is_some() && !self.is_override {
            return Err(Error::domain(
                "overridden_by is only meaningful on an override",
            ));
        }
        Ok(())
    }
}

/// Manual correction of an existing classification
#[derive(Debug, Clone, Default)]
pub struct ClassificationOverride {
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub tax_tags: TaxTags,
    pub notes: Option<String>,
}

// ========== Reconciliation ==========

/// One execution of an external matching process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationRun {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub strategy: RunStrategy,
    pub parameters: serde_json::Value,
    pub status: RunStatus,
    pub created_by: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewReconciliationRun {
    pub strategy: RunStrategy,
    pub parameters: serde_json::Value,
    pub created_by: Option<i64>,
    pub notes: Option<String>,
}

impl NewReconciliationRun {
    pub fn new(strategy: RunStrategy) -> Self {
        Self {
            strategy,
            parameters: serde_json::json!({}),
            created_by: None,
            notes: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.parameters.is_object() {
            return Err(Error::domain("run parameters must be a JSON object"));
        }
        Ok(())
    }
}

/// Outcome for one transaction within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub id: i64,
    pub run_id: i64,
    pub transaction_id: i64,
    /// Receipt upload the transaction was matched to
    pub matched_upload_id: Option<i64>,
    pub match_status: MatchStatus,
    pub match_score: Option<Confidence>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReconciliationResult {
    pub run_id: i64,
    pub transaction_id: i64,
    pub matched_upload_id: Option<i64>,
    pub match_status: MatchStatus,
    pub match_score: Option<Confidence>,
    pub notes: Option<String>,
}

impl NewReconciliationResult {
    pub fn new(run_id: i64, transaction_id: i64, match_status: MatchStatus) -> Self {
        Self {
            run_id,
            transaction_id,
            matched_upload_id: None,
            match_status,
            match_score: None,
            notes: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.match_status == MatchStatus::Unmatched && self.matched_upload_id.is_some() {
            return Err(Error::domain(
                "an unmatched result cannot reference a receipt",
            ));
        }
        Ok(())
    }
}

// ========== Reports ==========

/// Immutable period-keyed report snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub report_type: ReportType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub reconciliation_run_id: Option<i64>,
    pub parameters: serde_json::Value,
    pub payload: serde_json::Value,
    pub generated_by: Option<i64>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub report_type: ReportType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub reconciliation_run_id: Option<i64>,
    pub parameters: serde_json::Value,
    pub payload: serde_json::Value,
    pub generated_by: Option<i64>,
}

impl NewReport {
    pub fn new(
        report_type: ReportType,
        period_start: NaiveDate,
        period_end: NaiveDate,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            report_type,
            period_start,
            period_end,
            reconciliation_run_id: None,
            parameters: serde_json::json!({}),
            payload,
            generated_by: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_period(self.period_start, self.period_end)?;
        if self.payload.is_null() {
            return Err(Error::domain("report payload must not be null"));
        }
        Ok(())
    }
}

// ========== Status ==========

/// Row count for one ledger table
#[derive(Debug, Clone, Serialize)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: i64,
}
