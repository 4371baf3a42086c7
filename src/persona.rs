//! The closed set of chat personas.
//!
//! Every persona-specific fact (slug, display name, route, whether responses
//! need a professional disclaimer) lives in one table so the set is validated
//! in one place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    Medical,
    MentalHealth,
    Education,
    Finance,
    Legal,
    Career,
    Developer,
    Entertainment,
}

struct PersonaInfo {
    slug: &'static str,
    display_name: &'static str,
    route_slug: &'static str,
    sensitive: bool,
}

const fn info(persona: Persona) -> PersonaInfo {
    match persona {
        Persona::Medical => PersonaInfo {
            slug: "medical",
            display_name: "Medical Assistant",
            route_slug: "medical",
            sensitive: true,
        },
        Persona::MentalHealth => PersonaInfo {
            slug: "mental_health",
            display_name: "Mental Health Support",
            route_slug: "mental-health",
            sensitive: true,
        },
        Persona::Education => PersonaInfo {
            slug: "education",
            display_name: "Education Tutor",
            route_slug: "education",
            sensitive: false,
        },
        Persona::Finance => PersonaInfo {
            slug: "finance",
            display_name: "Financial Advisor",
            route_slug: "finance",
            sensitive: false,
        },
        Persona::Legal => PersonaInfo {
            slug: "legal",
            display_name: "Legal Assistant",
            route_slug: "legal",
            sensitive: true,
        },
        Persona::Career => PersonaInfo {
            slug: "career",
            display_name: "Career Coach",
            route_slug: "career",
            sensitive: false,
        },
        Persona::Developer => PersonaInfo {
            slug: "developer",
            display_name: "Developer Helper",
            route_slug: "developer",
            sensitive: false,
        },
        Persona::Entertainment => PersonaInfo {
            slug: "entertainment",
            display_name: "Entertainment Guide",
            route_slug: "entertainment",
            sensitive: false,
        },
    }
}

impl Persona {
    pub const ALL: [Persona; 8] = [
        Persona::Medical,
        Persona::MentalHealth,
        Persona::Education,
        Persona::Finance,
        Persona::Legal,
        Persona::Career,
        Persona::Developer,
        Persona::Entertainment,
    ];

    /// Stable identifier used as the registry key and in result envelopes.
    pub fn as_str(&self) -> &'static str {
        info(*self).slug
    }

    pub fn display_name(&self) -> &'static str {
        info(*self).display_name
    }

    /// Path segment used by HTTP front-ends (`mental-health` rather than
    /// `mental_health`).
    pub fn route_slug(&self) -> &'static str {
        info(*self).route_slug
    }

    /// Responses for sensitive personas are expected to carry a disclaimer.
    pub fn is_sensitive(&self) -> bool {
        info(*self).sensitive
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Persona {
    type Err = ChainError;

    /// Accepts the slug or the route slug, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Persona::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted || p.route_slug() == wanted)
            .ok_or_else(|| ChainError::unknown_persona(s))
    }
}
