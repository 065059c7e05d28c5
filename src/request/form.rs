use crate::cert::CaRecord;
use crate::names::{can_issue, DistinguishedName};
use crate::utils::errors::{DpkiError, Result};
use crate::utils::i18n::Messages;

/// One choice of the CA selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaOption {
    pub value: String,
    pub label: String,
}

impl From<&CaRecord> for CaOption {
    fn from(record: &CaRecord) -> Self {
        Self {
            value: record.subject.clone(),
            label: record.subject.clone(),
        }
    }
}

/// Certificate request form, built from the CA list fetched when it opens
#[derive(Debug, Clone, Default)]
pub struct RequestForm {
    records: Vec<CaRecord>,
    options: Vec<CaOption>,
}

impl RequestForm {
    pub fn new(records: Vec<CaRecord>) -> Self {
        let options = records.iter().map(CaOption::from).collect();
        Self { records, options }
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn options(&self) -> &[CaOption] {
        &self.options
    }

    /// Look up a chosen CA by its option value
    pub fn select(&self, value: &str) -> Result<&CaRecord> {
        let wanted = DistinguishedName::parse(value).ok();
        self.records
            .iter()
            .find(|record| {
                record.subject == value
                    || wanted
                        .as_ref()
                        .is_some_and(|dn| DistinguishedName::parse(&record.subject).ok().as_ref() == Some(dn))
            })
            .ok_or_else(|| DpkiError::CaNotFound(value.to_string()))
    }

    /// The closest CA able to issue for `subject`
    pub fn suggest(&self, subject: &DistinguishedName) -> Option<&CaRecord> {
        self.records
            .iter()
            .filter_map(|record| {
                let issuer = DistinguishedName::parse(&record.subject).ok()?;
                let distance = can_issue(&issuer, subject);
                (distance > 0).then_some((distance, record))
            })
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, record)| record)
    }

    /// Text lines of the form in its current state
    pub fn render(&self, messages: &Messages) -> Vec<String> {
        if self.is_empty() {
            return vec![messages.tr("request.no_ca")];
        }
        let mut lines = Vec::with_capacity(self.options.len() + 1);
        lines.push(messages.tr("request.select_ca"));
        for (index, option) in self.options.iter().enumerate() {
            lines.push(format!("  {}) {}", index + 1, option.label));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::i18n::Locale;

    fn records() -> Vec<CaRecord> {
        vec![
            CaRecord::new("CN=Wonderland main CA,C=WN"),
            CaRecord::new("CN=CA controlled by Cheshire Cat,STREET=Cat's house,L=Cheshire,C=WN"),
        ]
    }

    #[test]
    fn test_empty_form_shows_not_found() {
        let form = RequestForm::new(Vec::new());
        assert!(form.is_empty());
        assert_eq!(form.render(&Messages::new(Locale::En)), vec!["Not found available CA"]);

        let ru = form.render(&Messages::new(Locale::Ru));
        assert_eq!(ru.len(), 1);
        assert_ne!(ru[0], "Not found available CA");
    }

    #[test]
    fn test_options_follow_records() {
        let form = RequestForm::new(records());
        assert_eq!(form.options().len(), 2);
        for (option, record) in form.options().iter().zip(records()) {
            assert_eq!(option.value, record.subject);
            assert_eq!(option.label, record.subject);
        }

        let lines = form.render(&Messages::new(Locale::En));
        assert_eq!(lines[0], "Select CA:");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with("CN=Wonderland main CA,C=WN"));
    }

    #[test]
    fn test_select() {
        let form = RequestForm::new(records());
        assert!(form.select("CN=Wonderland main CA,C=WN").is_ok());
        assert!(form.select("CN=Wonderland main CA, C=WN").is_ok());
        assert!(matches!(
            form.select("CN=Unknown CA, C=WN"),
            Err(DpkiError::CaNotFound(_))
        ));
    }

    #[test]
    fn test_suggest_closest_ca() {
        let form = RequestForm::new(records());
        let kitten = DistinguishedName::parse("CN=Kitten, STREET=Cat's house, L=Cheshire, C=WN").unwrap();
        assert_eq!(
            form.suggest(&kitten).unwrap().subject,
            "CN=CA controlled by Cheshire Cat,STREET=Cat's house,L=Cheshire,C=WN"
        );

        let stranger = DistinguishedName::parse("CN=Stranger, C=XX").unwrap();
        assert!(form.suggest(&stranger).is_none());
    }
}
