use super::ContentSource;
use crate::error::SourceError;
use crate::model::{ContentMode, ParagraphSeed, SourceContent};
use crate::prompts;
use async_trait::async_trait;

const MAX_YEARS: usize = 200;

#[derive(Debug, Clone)]
pub struct TimelapseSource {
    topic: String,
    start_year: i32,
    end_year: i32,
}

impl TimelapseSource {
    pub fn new(topic: &str, start_year: i32, end_year: i32) -> Result<Self, SourceError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(SourceError::InvalidRequest("time-lapse topic is empty".into()));
        }
        if start_year > end_year {
            return Err(SourceError::InvalidRequest(format!(
                "start year {start_year} is after end year {end_year}"
            )));
        }
        let span = (end_year - start_year) as usize + 1;
        if span > MAX_YEARS {
            return Err(SourceError::InvalidRequest(format!(
                "{span} years requested, at most {MAX_YEARS} supported"
            )));
        }
        Ok(Self {
            topic: topic.to_string(),
            start_year,
            end_year,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + use<> {
        self.start_year..=self.end_year
    }
}

#[async_trait]
impl ContentSource for TimelapseSource {
    fn mode(&self) -> ContentMode {
        ContentMode::Timelapse
    }

    async fn fetch(&self) -> Result<SourceContent, SourceError> {
        let seeds: Vec<ParagraphSeed> = self
            .years()
            .map(|year| ParagraphSeed::labeled(prompts::timelapse_year(&self.topic, year), year.to_string()))
            .collect();
        if seeds.is_empty() {
            return Err(SourceError::Empty);
        }

        Ok(SourceContent {
            title: format!("Evolution of {} ({}-{})", self.topic, self.start_year, self.end_year),
            body: format!(
                "Watch how {} evolved from {} to {} in this AI-generated timelapse.",
                self.topic, self.start_year, self.end_year
            ),
            seeds,
        })
    }
}
