use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chat::{ChatHistory, Transcript, Turn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "9th and below")]
    NinthAndBelow,
    #[serde(rename = "10th")]
    Tenth,
    #[serde(rename = "11th")]
    Eleventh,
    #[serde(rename = "12th")]
    Twelfth,
}

impl Grade {
    pub const ALL: [Grade; 4] = [Grade::NinthAndBelow, Grade::Tenth, Grade::Eleventh, Grade::Twelfth];

    pub fn label(&self) -> &'static str {
        match self {
            Grade::NinthAndBelow => "9th and below",
            Grade::Tenth => "10th",
            Grade::Eleventh => "11th",
            Grade::Twelfth => "12th",
        }
    }

    pub fn from_label(label: &str) -> Option<Grade> {
        Grade::ALL.into_iter().find(|g| g.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
    Other,
}

impl Gender {
    pub const ALL: [Gender; 3] = [Gender::Female, Gender::Male, Gender::Other];

    pub fn label(&self) -> &'static str {
        match self {
            Gender::Female => "Female",
            Gender::Male => "Male",
            Gender::Other => "Other",
        }
    }

    pub fn from_label(label: &str) -> Option<Gender> {
        Gender::ALL.into_iter().find(|g| g.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Subjects offered on the intro form. Free-form interests are accepted too.
pub const SUBJECTS: [&str; 11] = [
    "Math",
    "Science",
    "History",
    "Literature",
    "Art",
    "Computer Science",
    "Economics",
    "Engineering",
    "Psychology",
    "Biology",
    "Other",
];

/// What the student tells us on the intro form. Fields are not validated;
/// anything left blank is simply interpolated as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub grade: Option<Grade>,
    #[serde(default)]
    pub school: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub gender: Option<Gender>,
    /// Selection order is kept, which is also the order they are listed back.
    #[serde(default)]
    pub interests: Vec<String>,
}

/// What the chat view starts from after the form is submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStart {
    pub welcome: String,
    pub transcript: Transcript,
    pub history: ChatHistory,
}

pub fn interest_clause(interests: &[String]) -> String {
    if interests.is_empty() {
        "You haven't selected any favorite subjects yet.".to_string()
    } else {
        format!("You mentioned you're interested in subjects like {}.", interests.join(", "))
    }
}

pub fn welcome_message(profile: &Profile) -> String {
    let grade = profile.grade.map(|g| g.label()).unwrap_or_default();
    let gender = profile.gender.map(|g| g.label()).unwrap_or_default();
    format!(
        "Welcome! You're in grade {}, from {} in {}, and identify as {}. {} Let's begin your planning journey!",
        grade,
        profile.school,
        profile.province,
        gender,
        interest_clause(&profile.interests)
    )
}

/// Builds the welcome bubble and the seed history.
///
/// The bubble is shown as coming from the advisor, but the same text is
/// recorded under the `user` role so the model sees it as context on the
/// next turn.
pub fn start(profile: &Profile) -> SessionStart {
    let welcome = welcome_message(profile);
    let transcript = vec![Turn { user: None, assistant: welcome.clone() }];
    let mut history = ChatHistory::new();
    history.push_user(welcome.clone());
    SessionStart { welcome, transcript, history }
}
