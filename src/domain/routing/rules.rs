//! Keyword rule table for the domain router.
//!
//! Rules are plain data checked in priority order over normalized text.
//! Priorities are distinct, so the highest matching rule always wins.

use serde::{Deserialize, Serialize};

use crate::domain::conversation::text::contains_any;
use crate::domain::conversation::Workflow;

/// Id of the "Continuar" button offered while workflows are suspended.
pub const RESUME_ID: &str = "resume";

/// Whole-message commands that abandon the active workflow.
const EXIT_WORDS: &[&str] = &["salir", "cancelar", "exit", "cancel", "menu", "stop"];

/// Whole-message words that bring back a suspended workflow.
const RESUME_WORDS: &[&str] = &[
    "continuar", "seguir", "sigamos", "volver", "retomar", "resume", "ok", "dale",
];

/// What a matched rule asks the router to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartIntent {
    Book,
    Cancel,
    Reschedule,
    Pay,
    Verify,
}

impl StartIntent {
    pub fn workflow(&self) -> Workflow {
        match self {
            StartIntent::Book | StartIntent::Cancel | StartIntent::Reschedule => {
                Workflow::Scheduling
            }
            StartIntent::Pay => Workflow::Payment,
            StartIntent::Verify => Workflow::Verification,
        }
    }

    /// Default intent for a workflow named by the classifier.
    pub fn for_workflow(workflow: Workflow) -> Option<Self> {
        match workflow {
            Workflow::Scheduling => Some(StartIntent::Book),
            Workflow::Payment => Some(StartIntent::Pay),
            Workflow::Verification => Some(StartIntent::Verify),
            Workflow::None => None,
        }
    }
}

/// One row of the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordRule {
    pub label: &'static str,
    /// Higher wins.
    pub priority: u8,
    /// Normalized phrases, matched on word boundaries.
    pub phrases: &'static [&'static str],
    /// `None` for generic "I want something" phrasing.
    pub intent: Option<StartIntent>,
}

impl KeywordRule {
    pub fn matches(&self, normalized: &str) -> bool {
        contains_any(normalized, self.phrases)
    }
}

pub const RULES: &[KeywordRule] = &[
    KeywordRule {
        label: "payment",
        priority: 40,
        phrases: &[
            "pagar", "pago", "link de pago", "abonar", "transferencia", "transferir",
        ],
        intent: Some(StartIntent::Pay),
    },
    KeywordRule {
        label: "verification",
        priority: 30,
        phrases: &[
            "cobertura", "me cubre", "me cubren", "cubre", "cubren", "isapre", "fonasa",
            "prevision", "convenio", "copago", "bono",
        ],
        intent: Some(StartIntent::Verify),
    },
    KeywordRule {
        label: "cancel_appointment",
        priority: 23,
        phrases: &[
            "cancelar mi hora", "cancelar la hora", "cancelar hora", "anular mi hora",
            "anular hora", "cancelar mi cita", "cancelar la cita", "anular",
        ],
        intent: Some(StartIntent::Cancel),
    },
    KeywordRule {
        label: "reschedule_appointment",
        priority: 22,
        phrases: &[
            "cambiar mi hora", "cambiar la hora", "cambiar hora", "reagendar", "mover mi hora",
            "cambiar mi cita", "cambiar la cita",
        ],
        intent: Some(StartIntent::Reschedule),
    },
    KeywordRule {
        label: "book_appointment",
        priority: 20,
        phrases: &[
            "agendar", "agenda", "reservar", "una hora", "pedir hora", "sacar hora", "tomar hora",
            "hora para", "cita", "turno", "horas disponibles", "disponibilidad",
        ],
        intent: Some(StartIntent::Book),
    },
    KeywordRule {
        label: "generic",
        priority: 10,
        phrases: &["quiero", "necesito", "quisiera", "me gustaria"],
        intent: None,
    },
];

/// Highest-priority rule matching `normalized`.
pub fn match_rules(normalized: &str) -> Option<&'static KeywordRule> {
    RULES
        .iter()
        .filter(|rule| rule.matches(normalized))
        .max_by_key(|rule| rule.priority)
}

pub fn is_exit_command(normalized: &str) -> bool {
    EXIT_WORDS.contains(&normalized)
}

pub fn is_resume_command(raw: &str, normalized: &str) -> bool {
    raw == RESUME_ID || RESUME_WORDS.contains(&normalized)
}

/// Workflow that owns an interactive selection id, by prefix.
pub fn workflow_for_selection(id: &str) -> Option<Workflow> {
    const PREFIXES: &[(&str, Workflow)] = &[
        ("slot:", Workflow::Scheduling),
        ("sched:", Workflow::Scheduling),
        ("appt:", Workflow::Scheduling),
        ("pay:", Workflow::Payment),
        ("svc:", Workflow::Payment),
        ("verify:", Workflow::Verification),
    ];
    PREFIXES
        .iter()
        .find(|(prefix, _)| id.starts_with(prefix))
        .map(|(_, workflow)| *workflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::text::normalize;

    fn intent(text: &str) -> Option<StartIntent> {
        match_rules(&normalize(text)).and_then(|rule| rule.intent)
    }

    #[test]
    fn payment_outranks_verification_and_scheduling() {
        assert_eq!(intent("quiero pagar el copago de la hora"), Some(StartIntent::Pay));
        assert_eq!(intent("¿mi isapre cubre la cita?"), Some(StartIntent::Verify));
        assert_eq!(intent("quiero agendar una hora"), Some(StartIntent::Book));
    }

    #[test]
    fn specific_scheduling_intents_beat_booking() {
        assert_eq!(intent("necesito cancelar mi hora del martes"), Some(StartIntent::Cancel));
        assert_eq!(intent("quiero reagendar"), Some(StartIntent::Reschedule));
    }

    #[test]
    fn priorities_are_distinct() {
        let mut priorities: Vec<_> = RULES.iter().map(|rule| rule.priority).collect();
        priorities.sort_unstable();
        priorities.dedup();
        assert_eq!(priorities.len(), RULES.len());
    }

    #[test]
    fn generic_phrasing_has_no_intent() {
        let rule = match_rules(&normalize("necesito ayuda")).unwrap();
        assert_eq!(rule.label, "generic");
        assert_eq!(rule.intent, None);
    }

    #[test]
    fn no_match() {
        assert!(match_rules(&normalize("¿a qué hora abren?")).is_none());
        assert!(match_rules("").is_none());
    }

    #[test]
    fn exit_only_as_whole_message() {
        assert!(is_exit_command("salir"));
        assert!(is_exit_command("menu"));
        assert!(!is_exit_command("cancelar mi hora"));
    }

    #[test]
    fn resume_button_and_words() {
        assert!(is_resume_command(RESUME_ID, "resume"));
        assert!(is_resume_command("Continuar", "continuar"));
        assert!(!is_resume_command("continuar con otra cosa", "continuar con otra cosa"));
    }

    #[test]
    fn selection_prefixes() {
        assert_eq!(workflow_for_selection("slot:1760961600:1760533200"), Some(Workflow::Scheduling));
        assert_eq!(workflow_for_selection("appt:evt-1"), Some(Workflow::Scheduling));
        assert_eq!(workflow_for_selection("svc:kinesiologia"), Some(Workflow::Payment));
        assert_eq!(workflow_for_selection("verify:new"), Some(Workflow::Verification));
        assert_eq!(workflow_for_selection("whatever"), None);
    }
}
