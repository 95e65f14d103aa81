//! The result artifact of a completed job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use datastory_core::{JobId, StoryId, UserId};

use crate::job::Job;

/// Narrative sections produced by the worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Narratives {
    pub summary: String,
    pub key_findings: String,
    pub recommendations: String,
}

/// Worker completion payload. Charts and statistics are opaque to this core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPayload {
    #[serde(default, alias = "narrative")]
    pub narratives: Narratives,
    #[serde(default)]
    pub charts: Vec<serde_json::Value>,
    #[serde(default)]
    pub statistics: serde_json::Value,
}

/// Dataset facts captured at admission, copied onto the story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    pub file_name: String,
    pub size_bytes: u64,
    pub row_count: u64,
    pub column_count: u64,
}

/// A finished narrative + charts + statistics report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: StoryId,
    pub job_id: JobId,
    pub owner_id: UserId,
    pub title: String,
    pub narratives: Narratives,
    pub charts: Vec<serde_json::Value>,
    pub statistics: serde_json::Value,
    pub dataset: DatasetMetadata,
    pub created_at: DateTime<Utc>,
}

impl Story {
    /// Build the story for `job` from the worker's completion payload.
    ///
    /// The title comes from the `title` option when the caller set one,
    /// otherwise from the uploaded file name without its extension.
    pub fn from_completion(job: &Job, payload: CompletionPayload, now: DateTime<Utc>) -> Self {
        let title = job
            .options
            .get("title")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                let name = job.source.file_name.as_str();
                name.rsplit_once('.')
                    .map_or(name, |(stem, _)| stem)
                    .to_string()
            });

        Self {
            id: StoryId::new(),
            job_id: job.id,
            owner_id: job.owner_id,
            title,
            narratives: payload.narratives,
            charts: payload.charts,
            statistics: payload.statistics,
            dataset: DatasetMetadata {
                file_name: job.source.file_name.clone(),
                size_bytes: job.source.size_bytes,
                row_count: job.source.row_count,
                column_count: job.source.column_count,
            },
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::fixtures;

    #[test]
    fn title_falls_back_to_file_stem() {
        let job = fixtures::job();
        let story = Story::from_completion(&job, CompletionPayload::default(), Utc::now());
        assert_eq!(story.title, "sales");
        assert_eq!(story.owner_id, job.owner_id);
        assert_eq!(story.job_id, job.id);
        assert_eq!(story.dataset.row_count, 10);
    }

    #[test]
    fn title_option_wins() {
        let mut job = fixtures::job();
        job.options = serde_json::json!({ "title": "Q3 revenue" });
        let story = Story::from_completion(&job, CompletionPayload::default(), Utc::now());
        assert_eq!(story.title, "Q3 revenue");
    }

    #[test]
    fn completion_payload_accepts_worker_shape() {
        let payload: CompletionPayload = serde_json::from_value(serde_json::json!({
            "narratives": {
                "summary": "Revenue grew.",
                "keyFindings": "- Q3 up 12%",
                "recommendations": "Expand."
            },
            "charts": [{ "type": "line" }],
            "statistics": { "rows": 10 }
        }))
        .unwrap();

        assert_eq!(payload.narratives.key_findings, "- Q3 up 12%");
        assert_eq!(payload.charts.len(), 1);
        assert_eq!(payload.statistics["rows"], 10);
    }
}
