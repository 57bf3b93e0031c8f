//! Coverage decisions.
//!
//! [`decide`] is a pure function of the catalog snapshot, the patient record,
//! the requested service and the decision date. Evaluation order:
//!
//! 1. Unknown service: `Error`, hand to a human.
//! 2. Age gate for age-restricted services, before any cost is looked at.
//!    Out of range yields `NotCovered` with no pricing at all.
//! 3. Special rules (service, provider, weekday) override the table.
//! 4. Unrecognized insurance provider: `Error`, hand to a human.
//! 5. Coverage table by (provider, service category).
//! 6. No table entry: private pay.

use chrono::{Datelike, NaiveDate};

use super::catalog::{Service, ServiceCatalog, SpecialRule};
use super::verdict::{format_clp, CoverageClass, NextAction, PaymentInfo, Verdict};
use crate::domain::verification::PatientRecord;

/// Computes the verdict for `patient` requesting `service` on `on`.
pub fn decide(
    catalog: &ServiceCatalog,
    patient: &PatientRecord,
    service: &str,
    on: NaiveDate,
) -> Verdict {
    let Some(service) = catalog.resolve_service(service) else {
        return error_verdict(
            format!(
                "No encontramos el servicio \"{}\" en nuestro catálogo. Te contactaremos con una persona del equipo.",
                service
            ),
            NextAction::ContactHuman,
        );
    };

    if let Some(range) = service.age_range {
        let Some(age_days) = patient.age_in_days(on) else {
            return error_verdict(
                format!(
                    "Para {} necesitamos la fecha de nacimiento del paciente. Revisemos tus datos.",
                    service.name
                ),
                NextAction::ReviewPatientData,
            );
        };
        if !range.contains(age_days) {
            return Verdict {
                classification: CoverageClass::NotCovered,
                required_documents: Vec::new(),
                payment_info: PaymentInfo::default(),
                next_action: NextAction::ContactHuman,
                explanation: format!(
                    "{} está disponible solo para pacientes dentro del rango de edad indicado, y la edad del paciente no corresponde. Una persona del equipo te orientará sobre otras alternativas.",
                    service.name
                ),
                preparation: None,
            };
        }
    }

    let provider = catalog.resolve_provider(&patient.insurance_provider);
    let provider_code = provider.map(|p| p.code.as_str());

    if let Some(rule) = catalog
        .special_rules
        .iter()
        .find(|rule| rule_applies(rule, service, provider_code, on))
    {
        return special_verdict(rule, service);
    }

    let Some(provider) = provider else {
        return error_verdict(
            format!(
                "No reconocemos la previsión \"{}\". Una persona del equipo revisará tu cobertura.",
                patient.insurance_provider
            ),
            NextAction::ContactHuman,
        );
    };

    let Some(entry) = catalog.coverage_for(&provider.code, &service.category) else {
        return private_verdict(
            service,
            format!(
                "{} no tiene convenio con nosotros para {}. Puedes atenderte de forma particular.",
                provider.name, service.name
            ),
        );
    };

    let mut documents = service.documents.clone();
    documents.extend(entry.documents.iter().cloned());

    match entry.classification {
        CoverageClass::Covered => Verdict {
            classification: CoverageClass::Covered,
            required_documents: documents,
            payment_info: PaymentInfo {
                copay: entry.copay,
                bond: entry.bond,
                ..PaymentInfo::default()
            },
            next_action: NextAction::ShowAppointments,
            explanation: format!("Tu previsión {} cubre {}.", provider.name, service.name),
            preparation: service.preparation.clone(),
        },
        CoverageClass::SpecialRate => Verdict {
            classification: CoverageClass::SpecialRate,
            required_documents: documents,
            payment_info: PaymentInfo {
                special_price: entry.special_price,
                copay: entry.copay,
                ..PaymentInfo::default()
            },
            next_action: NextAction::ShowAppointments,
            explanation: format!(
                "{} tiene un valor convenio para afiliados a {}.",
                service.name, provider.name
            ),
            preparation: service.preparation.clone(),
        },
        CoverageClass::WaitListed => Verdict {
            classification: CoverageClass::WaitListed,
            required_documents: documents,
            payment_info: PaymentInfo {
                private_price: Some(service.private_price),
                ..PaymentInfo::default()
            },
            next_action: NextAction::JoinWaitlist,
            explanation: format!(
                "{} con {} funciona por lista de espera. Te mostramos horas disponibles; si prefieres no esperar, puedes atenderte de forma particular por {}.",
                service.name,
                provider.name,
                format_clp(service.private_price)
            ),
            preparation: service.preparation.clone(),
        },
        CoverageClass::NotCovered | CoverageClass::PrivatePayOnly => private_verdict(
            service,
            format!(
                "Tu previsión {} no cubre {}. Puedes atenderte de forma particular.",
                provider.name, service.name
            ),
        )
        .with_classification(entry.classification),
        CoverageClass::Error => error_verdict(
            format!(
                "No pudimos determinar la cobertura de {} con {}. Una persona del equipo te contactará.",
                service.name, provider.name
            ),
            NextAction::ContactHuman,
        ),
    }
}

fn rule_applies(
    rule: &SpecialRule,
    service: &Service,
    provider: Option<&str>,
    on: NaiveDate,
) -> bool {
    let service_ok = rule.service.as_deref().map_or(true, |code| code == service.code);
    let provider_ok = match rule.provider.as_deref() {
        Some(code) => provider == Some(code),
        None => true,
    };
    let weekday_ok = rule.weekday.map_or(true, |day| day == on.weekday());
    service_ok && provider_ok && weekday_ok
}

fn special_verdict(rule: &SpecialRule, service: &Service) -> Verdict {
    let mut documents = service.documents.clone();
    documents.extend(rule.documents.iter().cloned());
    let payment_info = PaymentInfo {
        copay: rule.copay,
        special_price: rule.special_price,
        ..PaymentInfo::default()
    };
    let next_action = match rule.classification {
        CoverageClass::Covered | CoverageClass::SpecialRate => NextAction::ShowAppointments,
        CoverageClass::WaitListed => NextAction::JoinWaitlist,
        CoverageClass::PrivatePayOnly | CoverageClass::NotCovered => NextAction::OfferPrivatePay,
        CoverageClass::Error => NextAction::ContactHuman,
    };
    Verdict {
        classification: rule.classification,
        required_documents: documents,
        payment_info,
        next_action,
        explanation: rule.explanation.clone(),
        preparation: service.preparation.clone(),
    }
}

fn private_verdict(service: &Service, explanation: String) -> Verdict {
    Verdict {
        classification: CoverageClass::PrivatePayOnly,
        required_documents: service.documents.clone(),
        payment_info: PaymentInfo {
            private_price: Some(service.private_price),
            ..PaymentInfo::default()
        },
        next_action: NextAction::OfferPrivatePay,
        explanation,
        preparation: service.preparation.clone(),
    }
}

fn error_verdict(explanation: String, next_action: NextAction) -> Verdict {
    Verdict {
        classification: CoverageClass::Error,
        required_documents: Vec::new(),
        payment_info: PaymentInfo::default(),
        next_action,
        explanation,
        preparation: None,
    }
}

impl Verdict {
    fn with_classification(mut self, classification: CoverageClass) -> Self {
        self.classification = classification;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn catalog() -> ServiceCatalog {
        ServiceCatalog::embedded().unwrap()
    }

    // Wednesday
    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 15).unwrap()
    }

    fn patient(provider: &str, birth: Option<NaiveDate>) -> PatientRecord {
        PatientRecord {
            name: "Tomás Rojas".to_string(),
            insurance_provider: provider.to_string(),
            birth_date: birth,
            ..PatientRecord::default()
        }
    }

    fn six_years_old() -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2019, 3, 4)
    }

    #[test]
    fn provider_a_pediatric_consultation_is_covered_with_copay() {
        let verdict = decide(&catalog(), &patient("A", six_years_old()), "Consulta Pediátrica", today());
        assert_eq!(verdict.classification, CoverageClass::Covered);
        assert_eq!(verdict.payment_info.copay, Some(4000));
        assert_eq!(verdict.next_action, NextAction::ShowAppointments);
        assert!(!verdict.explanation.is_empty());
    }

    #[test]
    fn screening_above_age_range_is_not_covered_for_every_provider() {
        let catalog = catalog();
        for provider in ["A", "B", "FONASA", "PARTICULAR", "Desconocida"] {
            let verdict = decide(
                &catalog,
                &patient(provider, six_years_old()),
                "Evaluación del Desarrollo",
                today(),
            );
            assert_eq!(verdict.classification, CoverageClass::NotCovered, "{}", provider);
            assert!(verdict.payment_info.is_empty(), "{}", provider);
            assert_eq!(verdict.next_action, NextAction::ContactHuman);
        }
    }

    #[test]
    fn age_bounds_are_inclusive() {
        let catalog = catalog();
        // max_days is 2190
        let birth = today() - chrono::Duration::days(2190);
        let at_bound = decide(&catalog, &patient("A", Some(birth)), "evaluacion-desarrollo", today());
        assert_eq!(at_bound.classification, CoverageClass::Covered);
        let over = decide(
            &catalog,
            &patient("A", Some(birth - chrono::Duration::days(1))),
            "evaluacion-desarrollo",
            today(),
        );
        assert_eq!(over.classification, CoverageClass::NotCovered);
    }

    #[test]
    fn missing_birth_date_for_age_gated_service_asks_for_review() {
        let verdict = decide(&catalog(), &patient("A", None), "evaluacion-desarrollo", today());
        assert_eq!(verdict.classification, CoverageClass::Error);
        assert_eq!(verdict.next_action, NextAction::ReviewPatientData);
    }

    #[test]
    fn unknown_service_is_an_error() {
        let verdict = decide(&catalog(), &patient("A", six_years_old()), "Cirugía", today());
        assert_eq!(verdict.classification, CoverageClass::Error);
        assert_eq!(verdict.next_action, NextAction::ContactHuman);
    }

    #[test]
    fn unknown_provider_is_an_error_with_human_contact() {
        let verdict = decide(&catalog(), &patient("Isapre Z", six_years_old()), "fono", today());
        assert_eq!(verdict.classification, CoverageClass::Error);
        assert_eq!(verdict.next_action, NextAction::ContactHuman);
        assert!(verdict.explanation.contains("Isapre Z"));
    }

    #[test]
    fn service_rule_overrides_table() {
        let verdict = decide(&catalog(), &patient("A", six_years_old()), "kinesiologia", today());
        assert_eq!(verdict.classification, CoverageClass::SpecialRate);
        assert_eq!(verdict.payment_info.special_price, Some(15000));
    }

    #[test]
    fn provider_weekday_rule_applies_only_that_day() {
        let catalog = catalog();
        let saturday = NaiveDate::from_ymd_opt(2025, 10, 18).unwrap();
        let on_saturday = decide(&catalog, &patient("B", six_years_old()), "consulta-pediatrica", saturday);
        assert_eq!(on_saturday.payment_info.special_price, Some(18000));
        let on_wednesday = decide(&catalog, &patient("B", six_years_old()), "consulta-pediatrica", today());
        assert_eq!(on_wednesday.payment_info.special_price, Some(22000));
    }

    #[test]
    fn wait_listed_category() {
        let birth = NaiveDate::from_ymd_opt(2023, 1, 10);
        let verdict = decide(&catalog(), &patient("fonasa", birth), "evaluacion-desarrollo", today());
        assert_eq!(verdict.classification, CoverageClass::WaitListed);
        assert_eq!(verdict.next_action, NextAction::JoinWaitlist);
    }

    #[test]
    fn missing_table_entry_falls_back_to_private_pay() {
        let verdict = decide(&catalog(), &patient("Particular", six_years_old()), "fonoaudiologia", today());
        assert_eq!(verdict.classification, CoverageClass::PrivatePayOnly);
        assert_eq!(verdict.payment_info.private_price, Some(30000));
        assert_eq!(verdict.next_action, NextAction::OfferPrivatePay);
    }

    #[test]
    fn table_not_covered_keeps_classification_and_offers_private_pay() {
        let baby = NaiveDate::from_ymd_opt(2025, 6, 1);
        let verdict = decide(&catalog(), &patient("B", baby), "ecografia-cadera", today());
        assert_eq!(verdict.classification, CoverageClass::NotCovered);
        assert_eq!(verdict.payment_info.private_price, Some(42000));
        assert_eq!(verdict.next_action, NextAction::OfferPrivatePay);
    }

    #[test]
    fn covered_verdict_merges_documents_and_preparation() {
        let baby = NaiveDate::from_ymd_opt(2025, 6, 1);
        let verdict = decide(&catalog(), &patient("A", baby), "ecografia-cadera", today());
        assert_eq!(verdict.required_documents, vec!["Orden médica".to_string()]);
        assert!(verdict.preparation.is_some());
    }

    proptest! {
        #[test]
        fn decide_is_deterministic(
            provider in prop::sample::select(vec!["A", "B", "FONASA", "PARTICULAR", "X"]),
            service in prop::sample::select(vec![
                "consulta-pediatrica", "evaluacion-desarrollo", "kinesiologia",
                "fonoaudiologia", "ecografia-cadera", "desconocido",
            ]),
            age_days in 0i64..8000,
            offset_days in 0i64..14,
        ) {
            let catalog = catalog();
            let on = today() + chrono::Duration::days(offset_days);
            let record = patient(provider, Some(on - chrono::Duration::days(age_days)));
            let first = serde_json::to_vec(&decide(&catalog, &record, service, on)).unwrap();
            let second = serde_json::to_vec(&decide(&catalog, &record, service, on)).unwrap();
            prop_assert_eq!(&first, &second);
            let verdict = decide(&catalog, &record, service, on);
            prop_assert!(!verdict.explanation.is_empty());
        }
    }
}
