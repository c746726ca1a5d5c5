use std::sync::Arc;

use chrono::Utc;

use crate::domain::entity::{EventKey, EventPayload, PageViewTemplate};
use crate::error::PageViewError;
use crate::infrastructure::kafka_producer::PageViewEventPublisher;

#[derive(Debug, Clone)]
pub struct GeneratePageViewOutput {
    pub event_id: String,
}

/// GeneratePageViewUseCase は合成ページビューを 1 件生成して発行する。
pub struct GeneratePageViewUseCase {
    publisher: Arc<dyn PageViewEventPublisher>,
    template: PageViewTemplate,
}

impl GeneratePageViewUseCase {
    pub fn new(publisher: Arc<dyn PageViewEventPublisher>, template: PageViewTemplate) -> Self {
        Self {
            publisher,
            template,
        }
    }

    pub async fn execute(&self) -> Result<GeneratePageViewOutput, PageViewError> {
        self.execute_with_key(EventKey::generate()).await
    }

    /// 指定したキーでページビューを生成して発行する。
    pub async fn execute_with_key(
        &self,
        key: EventKey,
    ) -> Result<GeneratePageViewOutput, PageViewError> {
        key.validate()?;
        let payload = EventPayload::for_key(&key, &self.template, Utc::now());

        self.publisher.send_event(&key, &payload).await?;
        tracing::info!(event_id = %key.id, device = %payload.device, "sent fake page view");

        Ok(GeneratePageViewOutput { event_id: key.id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::kafka_producer::MockPageViewEventPublisher;

    #[tokio::test]
    async fn success() {
        let mut mock = MockPageViewEventPublisher::new();
        mock.expect_send_event()
            .withf(|key, payload| {
                key.id == payload.id
                    && payload.device == "web"
                    && payload.ip_address == "192.168.0.1"
                    && payload.referrer == "https://www.google.com"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let uc = GeneratePageViewUseCase::new(Arc::new(mock), PageViewTemplate::default());
        let output = uc.execute().await.unwrap();
        assert!(!output.event_id.is_empty());
    }

    #[tokio::test]
    async fn custom_template() {
        let mut mock = MockPageViewEventPublisher::new();
        mock.expect_send_event()
            .withf(|_, payload| payload.device == "mobile" && payload.referrer == "https://example.com")
            .times(1)
            .returning(|_, _| Ok(()));

        let template = PageViewTemplate {
            device: "mobile".to_string(),
            ip_address: "10.0.0.1".to_string(),
            referrer: "https://example.com".to_string(),
        };
        let uc = GeneratePageViewUseCase::new(Arc::new(mock), template);
        assert!(uc.execute().await.is_ok());
    }

    #[tokio::test]
    async fn with_fixed_key() {
        let mut mock = MockPageViewEventPublisher::new();
        mock.expect_send_event()
            .withf(|key, payload| key.id == "abc-123" && payload.id == "abc-123")
            .times(1)
            .returning(|_, _| Ok(()));

        let uc = GeneratePageViewUseCase::new(Arc::new(mock), PageViewTemplate::default());
        let output = uc
            .execute_with_key(EventKey {
                id: "abc-123".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(output.event_id, "abc-123");
    }

    #[tokio::test]
    async fn empty_key_rejected() {
        let mut mock = MockPageViewEventPublisher::new();
        mock.expect_send_event().never();

        let uc = GeneratePageViewUseCase::new(Arc::new(mock), PageViewTemplate::default());
        let result = uc.execute_with_key(EventKey { id: String::new() }).await;
        assert!(matches!(result, Err(PageViewError::InvalidEvent(_))));
    }

    #[tokio::test]
    async fn publish_error() {
        let mut mock = MockPageViewEventPublisher::new();
        mock.expect_send_event()
            .returning(|_, _| Err(PageViewError::Publish("broker connection refused".to_string())));

        let uc = GeneratePageViewUseCase::new(Arc::new(mock), PageViewTemplate::default());
        let err = uc.execute().await.unwrap_err();
        assert!(err.to_string().contains("broker connection refused"));
    }
}
