// src/ingest/providers/sample.rs
use anyhow::Result;
use async_trait::async_trait;

use crate::ingest::types::RawSource;
use crate::ingest::RawRecord;

/// Market-trend sample lines used for dry runs (`run --sample`).
pub const SAMPLE_HEADLINES: [&str; 7] = [
    "미국 내 배양육 시장, 고비용 문제로 세포 배양 방식에서 균사체(Mycelium) 기반 발효 방식으로 급격한 이동 중",
    "Better Meat Co 및 Prime Roots, 산업용 연속 발효 시스템 도입으로 생산 단가 30% 절감 성공",
    "2026년 푸드테크 트렌드: 'Precision Fermentation'과 버섯 균사체를 결합한 하이브리드 단백질 부상",
    "FDA 리스테리아 긴급 알림 발표 - 냉장 식품 관련",
    "고급 오디오 기술 최신 동향 - DSD 포맷 주류화",
    "NVIDIA Blackwell GPU, AI 인프라 혁신 주도",
    "스타트업 광고: 새 제품 출시 스폰서됨 (제외 대상)",
];

/// Plain-text records with the category guessed from the text.
#[derive(Debug, Clone, Default)]
pub struct StaticSampleSource {
    extra: Vec<String>,
}

impl StaticSampleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra.extend(lines.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl RawSource for StaticSampleSource {
    async fn fetch_records(&self) -> Result<Vec<RawRecord>> {
        Ok(SAMPLE_HEADLINES
            .iter()
            .map(|s| s.to_string())
            .chain(self.extra.iter().cloned())
            .map(RawRecord::plain)
            .collect())
    }

    fn name(&self) -> &str {
        "sample"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_every_sample_line() {
        let recs = StaticSampleSource::new().with_lines(["extra"]).fetch_records().await.unwrap();
        assert_eq!(recs.len(), SAMPLE_HEADLINES.len() + 1);
        assert_eq!(recs[0].kind(), "plain");
    }
}
