use std::collections::VecDeque;

use anyhow::Result;
use async_trait::async_trait;

use crate::backends::Source;

#[derive(Debug, Default)]
pub(crate) struct InMemorySource {
    pages: VecDeque<String>,
}

impl InMemorySource {
    pub(crate) fn new<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Source for InMemorySource {
    async fn next_page(&mut self) -> Result<Option<String>> {
        Ok(self.pages.pop_front())
    }
}
