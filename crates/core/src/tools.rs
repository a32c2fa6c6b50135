//! Agent-facing tools.
//!
//! Parameters arrive as loosely typed JSON and are deserialized into the
//! request structs below, whose JSON schemas are what the agent sees. Each
//! tool then validates its request; a problem becomes a [`ValidationError`]
//! before any collaborator is called. Every failure is reported back as
//! [`ToolOutput::Error`] so the agent can see and react to it.

use crate::cancel::until_cancelled;
use crate::orchestrator::ArticleRetriever;
use crate::traits::{DocumentFetcher, Embedder, UserDirectory, VectorIndex};
use crate::{
    ArticleQuery, RetrievalError, TimeRange, ValidationError, DEFAULT_LIMIT, DEFAULT_SCORE_FLOOR,
    MAX_LIMIT,
};
use async_trait::async_trait;
use chrono::FixedOffset;
use rmcp::schemars;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const SEARCH_ARTICLES: &str = "search_articles";
pub const SEARCH_USERS: &str = "search_users";
pub const USER_BENEFIT_RECORDS: &str = "get_user_benefit_records";

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Structured(Value),
    Error(String),
}

impl ToolOutput {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutput::Error(_))
    }
}

/// A number as agents actually send it: an integer, a float such as `10.0`,
/// or either one quoted as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum LooseNumber {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl LooseNumber {
    pub fn as_f64(&self, field: &'static str) -> Result<f64, ValidationError> {
        match self {
            LooseNumber::Integer(value) => Ok(*value as f64),
            LooseNumber::Float(value) => Ok(*value),
            LooseNumber::Text(raw) => {
                raw.trim()
                    .parse::<f64>()
                    .map_err(|_| ValidationError::InvalidField {
                        field,
                        details: format!("'{raw}' is not a number"),
                    })
            }
        }
    }

    /// Floats are accepted only when they hold a whole number.
    pub fn as_integer(&self, field: &'static str) -> Result<i64, ValidationError> {
        match self {
            LooseNumber::Integer(value) => Ok(*value),
            LooseNumber::Float(value) => whole_number(field, *value),
            LooseNumber::Text(raw) => match raw.trim().parse::<i64>() {
                Ok(value) => Ok(value),
                Err(_) => whole_number(field, self.as_f64(field)?),
            },
        }
    }
}

impl From<i64> for LooseNumber {
    fn from(value: i64) -> Self {
        LooseNumber::Integer(value)
    }
}

impl From<f64> for LooseNumber {
    fn from(value: f64) -> Self {
        LooseNumber::Float(value)
    }
}

fn whole_number(field: &'static str, value: f64) -> Result<i64, ValidationError> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        return Ok(value as i64);
    }
    Err(ValidationError::InvalidField {
        field,
        details: format!("{value} is not a whole number"),
    })
}

/// Semantic article search request.
#[derive(Debug, Clone, Default, Deserialize, schemars::JsonSchema)]
pub struct SearchArticlesParams {
    /// Natural-language question or long text; it is embedded automatically.
    pub query: String,
    /// Minimum similarity between 0 and 1, default 0.5.
    #[serde(default)]
    pub score: Option<LooseNumber>,
    /// Number of passages to retrieve, default 5, at most 100.
    #[serde(default)]
    pub limit: Option<LooseNumber>,
    /// Earliest creation time, formatted 2006-01-02 15:04:05 (UTC+8).
    #[serde(default)]
    pub start_time: Option<String>,
    /// Latest creation time, formatted 2006-01-02 15:04:05 (UTC+8).
    #[serde(default)]
    pub end_time: Option<String>,
}

/// Users registered within a time range.
#[derive(Debug, Clone, Default, Deserialize, schemars::JsonSchema)]
pub struct SearchUsersParams {
    /// Range start, formatted 2006-01-02 15:04:05 (UTC+8).
    pub start_time: String,
    /// Range end, formatted 2006-01-02 15:04:05 (UTC+8).
    pub end_time: String,
    /// Number of users to return, default 5, at most 100.
    #[serde(default)]
    pub limit: Option<LooseNumber>,
}

/// Free-access grants for a set of users and subscription columns.
#[derive(Debug, Clone, Default, Deserialize, schemars::JsonSchema)]
pub struct BenefitRecordsParams {
    /// User ids to check.
    pub user_ids: Vec<LooseNumber>,
    /// Column ids to check.
    pub subject_ids: Vec<LooseNumber>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserSearchRequest {
    pub range: TimeRange,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenefitRecordsRequest {
    pub user_ids: Vec<i64>,
    pub subject_ids: Vec<i64>,
}

/// Zero or missing means the default; above the cap is clamped.
fn resolve_limit(limit: Option<&LooseNumber>) -> Result<usize, ValidationError> {
    let Some(limit) = limit else {
        return Ok(DEFAULT_LIMIT);
    };
    match limit.as_integer("limit")? {
        0 => Ok(DEFAULT_LIMIT),
        value if value < 0 => Err(ValidationError::InvalidField {
            field: "limit",
            details: format!("{value} is negative"),
        }),
        value => Ok(usize::try_from(value).map_or(MAX_LIMIT, |value| value.min(MAX_LIMIT))),
    }
}

fn resolve_score(score: Option<&LooseNumber>) -> Result<f32, ValidationError> {
    let Some(score) = score else {
        return Ok(DEFAULT_SCORE_FLOOR);
    };
    let value = score.as_f64("score")?;
    if (0.0..=1.0).contains(&value) {
        Ok(value as f32)
    } else {
        Err(ValidationError::InvalidField {
            field: "score",
            details: format!("{value} is outside 0.0..=1.0"),
        })
    }
}

fn id_list(field: &'static str, ids: &[LooseNumber]) -> Result<Vec<i64>, ValidationError> {
    if ids.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    ids.iter().map(|id| id.as_integer(field)).collect()
}

fn required_text<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(value)
}

pub fn decode_article_query(
    params: &SearchArticlesParams,
    offset: FixedOffset,
) -> Result<ArticleQuery, RetrievalError> {
    let text = required_text("query", &params.query)?;
    let time_range = TimeRange::from_local(
        params.start_time.as_deref(),
        params.end_time.as_deref(),
        offset,
    )?;

    Ok(ArticleQuery::new(text)
        .with_score_floor(resolve_score(params.score.as_ref())?)
        .with_limit(resolve_limit(params.limit.as_ref())?)
        .with_time_range(time_range))
}

pub fn decode_user_search(
    params: &SearchUsersParams,
    offset: FixedOffset,
) -> Result<UserSearchRequest, RetrievalError> {
    let start = required_text("start_time", &params.start_time)?;
    let end = required_text("end_time", &params.end_time)?;

    let range = TimeRange::from_local(Some(start), Some(end), offset)?
        .ok_or(ValidationError::MissingField("start_time"))?;
    Ok(UserSearchRequest {
        range,
        limit: resolve_limit(params.limit.as_ref())?,
    })
}

pub fn decode_benefit_records(
    params: &BenefitRecordsParams,
) -> Result<BenefitRecordsRequest, RetrievalError> {
    Ok(BenefitRecordsRequest {
        user_ids: id_list("user_ids", &params.user_ids)?,
        subject_ids: id_list("subject_ids", &params.subject_ids)?,
    })
}

/// The tool operations, independent of how they are exposed.
#[async_trait]
pub trait ToolService: Send + Sync {
    async fn search_articles(
        &self,
        params: SearchArticlesParams,
        cancel: &CancellationToken,
    ) -> ToolOutput;

    async fn search_users(&self, params: SearchUsersParams, cancel: &CancellationToken)
        -> ToolOutput;

    async fn user_benefit_records(
        &self,
        params: BenefitRecordsParams,
        cancel: &CancellationToken,
    ) -> ToolOutput;
}

/// Runs the tools against the retriever and the user directory.
pub struct ToolBox<E, V, D, U>
where
    E: Embedder,
    V: VectorIndex,
    D: DocumentFetcher,
    U: UserDirectory,
{
    retriever: ArticleRetriever<E, V, D>,
    users: U,
    offset: FixedOffset,
}

impl<E, V, D, U> ToolBox<E, V, D, U>
where
    E: Embedder,
    V: VectorIndex,
    D: DocumentFetcher,
    U: UserDirectory,
{
    pub fn new(retriever: ArticleRetriever<E, V, D>, users: U, offset: FixedOffset) -> Self {
        Self {
            retriever,
            users,
            offset,
        }
    }

    async fn run_search_articles(
        &self,
        params: &SearchArticlesParams,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, RetrievalError> {
        let query = decode_article_query(params, self.offset)?;
        let bundle = self.retriever.retrieve(&query, cancel).await?;
        Ok(ToolOutput::Text(bundle.render()))
    }

    async fn run_search_users(
        &self,
        params: &SearchUsersParams,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, RetrievalError> {
        let request = decode_user_search(params, self.offset)?;
        let users = until_cancelled(
            cancel,
            self.users
                .users_created_between(&request.range, request.limit),
        )
        .await?;
        Ok(ToolOutput::Structured(json!({ "users": users })))
    }

    async fn run_benefit_records(
        &self,
        params: &BenefitRecordsParams,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, RetrievalError> {
        let request = decode_benefit_records(params)?;
        let records = until_cancelled(
            cancel,
            self.users
                .benefit_records(&request.user_ids, &request.subject_ids),
        )
        .await?;
        Ok(ToolOutput::Structured(json!({ "records": records })))
    }
}

fn report(tool: &str, result: Result<ToolOutput, RetrievalError>) -> ToolOutput {
    match result {
        Ok(output) => output,
        Err(error) => {
            warn!(tool, %error, "tool call failed");
            ToolOutput::Error(error.to_string())
        }
    }
}

#[async_trait]
impl<E, V, D, U> ToolService for ToolBox<E, V, D, U>
where
    E: Embedder,
    V: VectorIndex,
    D: DocumentFetcher,
    U: UserDirectory,
{
    async fn search_articles(
        &self,
        params: SearchArticlesParams,
        cancel: &CancellationToken,
    ) -> ToolOutput {
        info!(tool = SEARCH_ARTICLES, "tool call");
        report(
            SEARCH_ARTICLES,
            self.run_search_articles(&params, cancel).await,
        )
    }

    async fn search_users(
        &self,
        params: SearchUsersParams,
        cancel: &CancellationToken,
    ) -> ToolOutput {
        info!(tool = SEARCH_USERS, "tool call");
        report(SEARCH_USERS, self.run_search_users(&params, cancel).await)
    }

    async fn user_benefit_records(
        &self,
        params: BenefitRecordsParams,
        cancel: &CancellationToken,
    ) -> ToolOutput {
        info!(tool = USER_BENEFIT_RECORDS, "tool call");
        report(
            USER_BENEFIT_RECORDS,
            self.run_benefit_records(&params, cancel).await,
        )
    }
}
