use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub const COLOR_GREEN: &str = "#28a745";
pub const COLOR_RED: &str = "#dc3545";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    PersonalIllness,
    FamilyIllness,
    PersonalMatters,
    ConvocationAtOtherInstitution,
    Unexcused,
    PreExam,
    Mourning,
    Exam,
    LaborStoppage,
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::PersonalIllness,
        Category::FamilyIllness,
        Category::PersonalMatters,
        Category::ConvocationAtOtherInstitution,
        Category::Unexcused,
        Category::PreExam,
        Category::Mourning,
        Category::Exam,
        Category::LaborStoppage,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::PersonalIllness => "personal-illness",
            Category::FamilyIllness => "family-illness",
            Category::PersonalMatters => "personal-matters",
            Category::ConvocationAtOtherInstitution => "convocation-at-other-institution",
            Category::Unexcused => "unexcused",
            Category::PreExam => "pre-exam",
            Category::Mourning => "mourning",
            Category::Exam => "exam",
            Category::LaborStoppage => "labor-stoppage",
            Category::Other => "other",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Category::ConvocationAtOtherInstitution => COLOR_GREEN,
            _ => COLOR_RED,
        }
    }
}

/// Trimmed, lowercased, with diacritical marks removed ("Enfermedad  Personal " ->
/// "enfermedad  personal", "PRE-EXÁMEN" -> "pre-examen").
pub fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

fn tokens(normalized: &str) -> impl Iterator<Item = &str> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
}

fn contains_any(normalized: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| normalized.contains(n))
}

fn is_personal_illness(c: &str) -> bool {
    contains_any(c, &["enfermedad personal", "personal illness"])
}

fn is_family_illness(c: &str) -> bool {
    contains_any(c, &["enfermedad familiar", "family illness"])
}

fn is_personal_matters(c: &str) -> bool {
    contains_any(c, &["particular", "personal matters"])
}

fn is_convocation_elsewhere(c: &str) -> bool {
    contains_any(c, &["citacion", "convocatoria", "citation", "convocation"])
        && contains_any(
            c,
            &[
                "otro establecimiento",
                "otros establecimientos",
                "otro est",
                "other institution",
            ],
        )
}

fn is_unexcused(c: &str) -> bool {
    contains_any(c, &["injustificada", "unexcused", "unjustified"])
}

/// Both "pre" and "exam" appear anywhere in the text, in either order
/// ("pre examen", "preexamen", "examen previo").
pub fn is_pre_exam(c: &str) -> bool {
    c.contains("pre") && c.contains("exam")
}

fn is_mourning(c: &str) -> bool {
    contains_any(c, &["duelo", "mourning", "bereavement"])
}

fn is_exam(c: &str) -> bool {
    c.contains("exam")
}

fn is_labor_stoppage(c: &str) -> bool {
    tokens(c).any(|t| t == "paro" || t == "strike")
        || contains_any(c, &["labor stoppage", "work stoppage"])
}

type Rule = (Category, fn(&str) -> bool);

/// Evaluated top to bottom, first match wins. Pre-exam sits above exam.
const RULES: [Rule; 9] = [
    (Category::PersonalIllness, is_personal_illness),
    (Category::FamilyIllness, is_family_illness),
    (Category::PersonalMatters, is_personal_matters),
    (Category::ConvocationAtOtherInstitution, is_convocation_elsewhere),
    (Category::Unexcused, is_unexcused),
    (Category::PreExam, is_pre_exam),
    (Category::Mourning, is_mourning),
    (Category::Exam, is_exam),
    (Category::LaborStoppage, is_labor_stoppage),
];

/// Classifies an already normalized cause.
pub fn classify(normalized: &str) -> Category {
    RULES
        .iter()
        .find(|(_, matches)| matches(normalized))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Other)
}

/// Normalizes and classifies a raw cause.
pub fn bucket(cause: &str) -> Category {
    classify(&normalize(cause))
}

pub fn color_for(cause: &str) -> &'static str {
    bucket(cause).color()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_case_accents_and_outer_space() {
        assert_eq!(
            normalize("  Citación en OTRO Establecimiento "),
            "citacion en otro establecimiento"
        );
        assert_eq!(normalize("PRE-EXÁMEN"), "pre-examen");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["Enfermedad Familiar", "DUELO ñandú", "Ça va", "pre exámen", ""] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "input {raw:?}");
        }
    }

    #[test]
    fn pre_exam_wins_over_exam_regardless_of_spelling() {
        for raw in ["PRE-EXÁMEN", "pre examen", "Pre Exam", "preexamen", "Día pre-examen final"] {
            assert_eq!(bucket(raw), Category::PreExam, "input {raw:?}");
        }
        assert_eq!(bucket("Examen final"), Category::Exam);
        assert_eq!(bucket("exam"), Category::Exam);
    }

    #[test]
    fn pre_anywhere_with_exam_is_pre_exam() {
        for raw in ["Presentación de examen", "preparación examen final", "Examen previo"] {
            assert_eq!(bucket(raw), Category::PreExam, "input {raw:?}");
            assert!(is_pre_exam(&normalize(raw)), "input {raw:?}");
        }
        assert!(!is_pre_exam("preparacion de clases"));
        assert!(!is_pre_exam("examen final"));
    }

    #[test]
    fn rule_order_is_first_match() {
        assert_eq!(bucket("Enfermedad personal"), Category::PersonalIllness);
        assert_eq!(bucket("personal illness"), Category::PersonalIllness);
        assert_eq!(bucket("Enfermedad familiar"), Category::FamilyIllness);
        assert_eq!(bucket("Razones particulares"), Category::PersonalMatters);
        assert_eq!(bucket("personal matters"), Category::PersonalMatters);
        assert_eq!(
            bucket("Convocatoria en otros establecimientos"),
            Category::ConvocationAtOtherInstitution
        );
        assert_eq!(
            bucket("citation at other institution"),
            Category::ConvocationAtOtherInstitution
        );
        assert_eq!(bucket("Citación judicial"), Category::Other);
        assert_eq!(bucket("Injustificada"), Category::Unexcused);
        assert_eq!(bucket("unjustified"), Category::Unexcused);
        assert_eq!(bucket("Duelo"), Category::Mourning);
        assert_eq!(bucket("Paro docente"), Category::LaborStoppage);
        assert_eq!(bucket("labor stoppage"), Category::LaborStoppage);
        assert_eq!(bucket("Comparo horarios"), Category::Other);
        assert_eq!(bucket("Trámite"), Category::Other);
        assert_eq!(bucket(""), Category::Other);
    }

    #[test]
    fn only_convocation_is_green() {
        assert_eq!(color_for("Citación otro establecimiento"), COLOR_GREEN);
        assert_eq!(color_for("Enfermedad personal"), COLOR_RED);
        assert_eq!(color_for(""), COLOR_RED);
    }

    #[test]
    fn category_names_serialize_kebab_case() {
        for c in Category::ALL {
            let v = serde_json::to_value(c).expect("serialize");
            assert_eq!(v.as_str(), Some(c.as_str()));
        }
    }
}
