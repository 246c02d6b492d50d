use schemars::JsonSchema;
use serde::{de, Deserialize, Deserializer, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};
use thiserror::Error;

/// Anatomical levels evaluated in a DISE exam, ordered from the top of the airway down
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnatomicalLevel {
    /// Soft palate and uvula
    VeloPalato,
    /// Oropharynx, lateral walls and tonsils
    Orofaringe,
    /// Epiglottis and tongue base
    EpigloteBaseLingua,
}

/// Collapse pattern reported for a level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Display)]
pub enum CollapsePattern {
    Anteroposterior,
    Lateral,
    #[serde(rename = "Concêntrico", alias = "Concentrico")]
    #[strum(serialize = "Concêntrico")]
    Concentrico,
    Ausente,
}

/// Accepts `45` and `45.0`; fractional or non-finite numbers are rejected
fn integral_percentage<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite()
        || value.fract().abs() > f64::EPSILON
        || value < f64::from(i32::MIN)
        || value > f64::from(i32::MAX)
    {
        return Err(de::Error::custom(format!(
            "expected a whole number, got {value}"
        )));
    }

    #[allow(clippy::cast_possible_truncation)]
    Ok(value as i32)
}

/// Findings for a single anatomical level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LevelAnalysis {
    /// Airway obstruction, 0-100
    #[serde(deserialize_with = "integral_percentage")]
    #[schemars(with = "i32")]
    pub obstrucao_percentual: i32,
    /// Collapse pattern
    pub padrao_colapso: CollapsePattern,
    /// Short description of the findings
    pub descricao: String,
}

/// Structured report produced by the inference vendor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    pub velo_palato: LevelAnalysis,
    pub orofaringe: LevelAnalysis,
    pub epiglote_base_lingua: LevelAnalysis,
    /// Model confidence, 0-100
    #[serde(deserialize_with = "integral_percentage")]
    #[schemars(with = "i32")]
    pub nivel_confianca: i32,
    /// Integrated clinical summary (pt-BR)
    pub analise_clinica: String,
}

/// A percentage field fell outside 0-100
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} out of range: {value}")]
pub struct RangeError {
    pub field: String,
    pub value: i32,
}

impl AnalysisResult {
    /// Returns the findings for `level`
    #[must_use]
    pub const fn level(&self, level: AnatomicalLevel) -> &LevelAnalysis {
        match level {
            AnatomicalLevel::VeloPalato => &self.velo_palato,
            AnatomicalLevel::Orofaringe => &self.orofaringe,
            AnatomicalLevel::EpigloteBaseLingua => &self.epiglote_base_lingua,
        }
    }

    /// Checks every percentage field is within 0-100
    ///
    /// # Errors
    ///
    /// Returns the first field found outside the range
    pub fn check_ranges(&self) -> Result<(), RangeError> {
        let percentages = AnatomicalLevel::iter()
            .map(|level| {
                (
                    format!("{level}.obstrucao_percentual"),
                    self.level(level).obstrucao_percentual,
                )
            })
            .chain(std::iter::once((
                "nivel_confianca".to_string(),
                self.nivel_confianca,
            )));

        for (field, value) in percentages {
            if !(0..=100).contains(&value) {
                return Err(RangeError { field, value });
            }
        }
        Ok(())
    }

    /// Summarizes severity per level and locates the nadir
    #[must_use]
    pub fn report(&self) -> AnalysisReport {
        let levels: Vec<LevelSeverity> = AnatomicalLevel::iter()
            .map(|level| LevelSeverity {
                level,
                severity: Severity::from_percentage(self.level(level).obstrucao_percentual),
            })
            .collect();

        // Ties go to the higher level in the airway
        let (nadir, max_obstruction) = AnatomicalLevel::iter()
            .map(|level| (level, self.level(level).obstrucao_percentual))
            .fold((AnatomicalLevel::VeloPalato, i32::MIN), |best, candidate| {
                if candidate.1 > best.1 {
                    candidate
                } else {
                    best
                }
            });

        AnalysisReport {
            levels,
            nadir,
            max_obstruction,
        }
    }
}

/// Clinical grading of an obstruction percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum Severity {
    /// Up to 25%
    Leve,
    /// Up to 50%
    Moderada,
    /// Up to 75%
    Significativa,
    /// Above 75%
    Severa,
}

impl Severity {
    #[must_use]
    pub const fn from_percentage(value: i32) -> Self {
        if value <= 25 {
            Self::Leve
        } else if value <= 50 {
            Self::Moderada
        } else if value <= 75 {
            Self::Significativa
        } else {
            Self::Severa
        }
    }
}

/// Severity of one level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LevelSeverity {
    pub level: AnatomicalLevel,
    pub severity: Severity,
}

/// Derived summary returned next to the raw result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisReport {
    /// Severity of each level, in anatomical order
    pub levels: Vec<LevelSeverity>,
    /// Level with the highest obstruction
    pub nadir: AnatomicalLevel,
    /// Obstruction at the nadir
    pub max_obstruction: i32,
}

/// Outcome of an analysis request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<AnalysisReport>,
    /// Human-readable failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResponse {
    #[must_use]
    pub fn completed(result: AnalysisResult) -> Self {
        let report = result.report();
        Self {
            success: true,
            data: Some(result),
            report: Some(report),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            report: None,
            error: Some(message.into()),
        }
    }
}
