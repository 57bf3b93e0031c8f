//! Answers to questions that belong to no workflow.

use std::sync::Arc;

use crate::application::retry::{with_retry, RetryPolicy};
use crate::domain::conversation::{ConversationContext, Reply, TurnRole, UserInput};
use crate::domain::decision::ServiceCatalog;
use crate::domain::routing::RESUME_ID;
use crate::ports::{AIProvider, CompletionRequest, MessageRole, RequestMetadata};

const INQUIRY_HISTORY: usize = 4;

pub struct InquiryResponder {
    ai: Arc<dyn AIProvider>,
    catalog: Arc<ServiceCatalog>,
    clinic_name: String,
    human_contact: String,
    retry: RetryPolicy,
}

impl InquiryResponder {
    pub fn new(
        ai: Arc<dyn AIProvider>,
        catalog: Arc<ServiceCatalog>,
        clinic_name: impl Into<String>,
        human_contact: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ai,
            catalog,
            clinic_name: clinic_name.into(),
            human_contact: human_contact.into(),
            retry,
        }
    }

    /// Answers from the clinic facts, or with a canned pointer to a human.
    ///
    /// While workflows are suspended the reply offers a "Continuar" button.
    pub async fn answer(&self, ctx: &ConversationContext, input: &UserInput) -> Reply {
        let text = match self.generate(ctx, input).await {
            Some(text) => text,
            None => self.fallback(),
        };
        let reply = Reply::text(text);
        if ctx.suspended.is_empty() {
            reply
        } else {
            reply
                .followed_by(Reply::text("Cuando quieras, seguimos donde quedamos."))
                .with_buttons(vec![(RESUME_ID, "Continuar")])
        }
    }

    /// What to say when nothing in particular was asked.
    pub fn menu(&self) -> Reply {
        Reply::text(format!(
            "Hola, soy el asistente de {}. Puedo ayudarte a agendar, cambiar o cancelar una hora, \
             revisar tu cobertura o pagar una atención. ¿Qué necesitas?",
            self.clinic_name
        ))
    }

    fn fallback(&self) -> String {
        format!(
            "Por ahora no puedo responder esa consulta. Escríbenos a {} y te ayudamos.",
            self.human_contact
        )
    }

    fn system_prompt(&self) -> String {
        format!(
            "Eres el asistente de {} por chat. Responde en español, en pocas líneas, usando solo \
             esta información:\n\n{}\n\nSi la respuesta no está ahí, pide escribir a {}.",
            self.clinic_name, self.catalog.about, self.human_contact
        )
    }

    async fn generate(&self, ctx: &ConversationContext, input: &UserInput) -> Option<String> {
        let mut request = CompletionRequest::new(RequestMetadata::new(ctx.user_id.clone(), "inquiry"))
            .with_system_prompt(self.system_prompt())
            .with_max_tokens(300)
            .with_temperature(0.2);
        let skip = ctx.history.len().saturating_sub(INQUIRY_HISTORY);
        for turn in &ctx.history[skip..] {
            let role = match turn.role {
                TurnRole::User => MessageRole::User,
                TurnRole::Assistant => MessageRole::Assistant,
            };
            request = request.with_message(role, turn.text.clone());
        }
        if ctx.history.last().map(|t| t.text.as_str()) != Some(input.raw.as_str()) {
            request = request.with_message(MessageRole::User, input.raw.clone());
        }

        match with_retry(&self.retry, "ai.inquiry", || self.ai.complete(request.clone())).await {
            Ok(response) if !response.content.trim().is_empty() => {
                Some(response.content.trim().to_string())
            }
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(user_id = %ctx.user_id, error = %err, "inquiry generation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::{MockAIProvider, MockError};
    use crate::domain::conversation::{Flow, Interactive};
    use crate::domain::foundation::UserId;
    use crate::domain::scheduling::{SchedulingPayload, SchedulingState};
    use std::time::Duration;

    fn responder(ai: MockAIProvider) -> InquiryResponder {
        InquiryResponder::new(
            Arc::new(ai),
            Arc::new(ServiceCatalog::embedded().unwrap()),
            "Clínica Demo",
            "+56 2 2345 6789",
            RetryPolicy::no_retry(Duration::from_secs(1)),
        )
    }

    fn idle() -> ConversationContext {
        ConversationContext::new(UserId::new("+56911112222").unwrap())
    }

    #[tokio::test]
    async fn generated_answer_uses_catalog_facts() {
        let ai = MockAIProvider::new().with_response("Atendemos de lunes a viernes.");
        let responder = responder(ai.clone());
        let reply = responder
            .answer(&idle(), &UserInput::text("¿Qué horario tienen?"))
            .await;
        assert_eq!(reply.text, "Atendemos de lunes a viernes.");
        assert!(reply.interactive.is_none());
        let calls = ai.get_calls();
        let prompt = calls[0].system_prompt.as_deref().unwrap_or_default();
        assert!(prompt.contains("Clínica Demo"));
    }

    #[tokio::test]
    async fn failure_falls_back_to_human_contact() {
        let ai = MockAIProvider::new().with_error(MockError::Unavailable {
            message: "down".to_string(),
        });
        let reply = responder(ai).answer(&idle(), &UserInput::text("¿Tienen estacionamiento?")).await;
        assert!(reply.text.contains("+56 2 2345 6789"));
    }

    #[tokio::test]
    async fn suspended_work_offers_continue_button() {
        let mut ctx = idle();
        ctx.flow = Flow::Scheduling {
            state: SchedulingState::OfferingSlots,
            payload: SchedulingPayload::default(),
        };
        ctx.suspend_active(5);
        let reply = responder(MockAIProvider::new().with_response("Sí, hay estacionamiento."))
            .answer(&ctx, &UserInput::text("¿Tienen estacionamiento?"))
            .await;
        match reply.interactive {
            Some(Interactive::Buttons { buttons }) => assert_eq!(buttons[0].id, RESUME_ID),
            other => panic!("expected buttons, got {:?}", other),
        }
    }
}
