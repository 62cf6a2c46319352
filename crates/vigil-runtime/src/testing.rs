//! Scripted literature source shared by the runtime's tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use vigil_core::{LiteratureResult, Paper};

use crate::literature::{LiteratureQuery, LiteratureSource, QueryError, RequestPacer};

type Reply = Result<LiteratureResult, QueryError>;

/// Answers each symptom from a script of replies.
///
/// Replies are consumed in order; the last one repeats forever. A symptom
/// without a script fails with `NotFound`. Each search is one paced
/// request.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(self, symptom: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .insert(symptom.to_string(), replies.into_iter().collect());
        self
    }

    /// Always answer `symptom` with `paper_count` papers.
    pub(crate) fn papers(self, symptom: &str, paper_count: u64) -> Self {
        self.script(symptom, vec![Ok(result(paper_count))])
    }

    /// Every query sent, in order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn calls_for(&self, symptom: &str) -> usize {
        self.calls.lock().iter().filter(|s| *s == symptom).count()
    }

    fn next_reply(&self, symptom: &str) -> Reply {
        let mut scripts = self.scripts.lock();
        let Some(script) = scripts.get_mut(symptom) else {
            return Err(QueryError::NotFound(symptom.to_string()));
        };
        let reply = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        reply.unwrap_or_else(|| Err(QueryError::NotFound(symptom.to_string())))
    }
}

#[async_trait]
impl LiteratureSource for ScriptedSource {
    async fn search(
        &self,
        query: &LiteratureQuery,
        pacer: &RequestPacer<'_>,
    ) -> Result<LiteratureResult, QueryError> {
        self.calls.lock().push(query.symptom.clone());
        let reply = self.next_reply(&query.symptom);
        pacer.send(async move { reply }).await
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A result with `paper_count` papers and up to three listed.
pub(crate) fn result(paper_count: u64) -> LiteratureResult {
    let papers = (0..paper_count.min(3))
        .map(|i| Paper {
            title: format!("Paper {}", i + 1),
            year: Some(2020 + i as i32),
            journal: "Obesity".to_string(),
        })
        .collect();
    LiteratureResult::new(paper_count, papers)
}

pub(crate) fn server_error() -> QueryError {
    QueryError::ApiError {
        status: 503,
        message: "Service Unavailable".to_string(),
    }
}

pub(crate) fn bad_request() -> QueryError {
    QueryError::ApiError {
        status: 400,
        message: "Bad Request".to_string(),
    }
}
