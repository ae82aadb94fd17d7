//! Situational context extracted from free text.
//!
//! Each field is detected independently from its own keyword family; a field
//! with no match stays `None`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::intent::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Workout,
    Studying,
    Working,
    Commuting,
    Relaxing,
    Sleeping,
    Partying,
    Cooking,
    Cleaning,
    Reading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialContext {
    Alone,
    WithFriends,
    WithPartner,
    WithFamily,
    WithColleagues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Home,
    Work,
    Gym,
    Car,
    Outdoors,
    Cafe,
    School,
    Transit,
}

/// Situational signals known about the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextSignals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<TimeOfDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social: Option<SocialContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl ContextSignals {
    /// Returns true if at least one signal has been captured.
    pub fn has_any(&self) -> bool {
        self.activity.is_some()
            || self.time_of_day.is_some()
            || self.social.is_some()
            || self.location.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_any()
    }

    /// Combines two snapshots; fields present in `newer` win.
    pub fn merge(&self, newer: &ContextSignals) -> ContextSignals {
        ContextSignals {
            activity: newer.activity.or(self.activity),
            time_of_day: newer.time_of_day.or(self.time_of_day),
            social: newer.social.or(self.social),
            location: newer.location.or(self.location),
        }
    }
}

type Family<T> = Vec<(T, Regex)>;

fn family<T: Copy>(entries: &[(T, &str)]) -> Family<T> {
    entries
        .iter()
        .map(|(value, pattern)| {
            let regex = Regex::new(pattern)
                .unwrap_or_else(|e| panic!("invalid context pattern {pattern:?}: {e}"));
            (*value, regex)
        })
        .collect()
}

static ACTIVITIES: Lazy<Family<Activity>> = Lazy::new(|| {
    family(&[
        (Activity::Workout, r"\b(work(ing)? out|workout|gym session|running|jogging|lifting|exercis(e|ing)|training|cardio)\b"),
        (Activity::Studying, r"\b(study(ing)?|homework|revising|exam prep|cramming)\b"),
        (Activity::Working, r"\b(working|at my desk|in a meeting|coding|on a deadline)\b"),
        (Activity::Commuting, r"\b(driving|commut(e|ing)|on my way|on the (bus|train|subway))\b"),
        (Activity::Relaxing, r"\b(relax(ing)?|chilling|unwinding|lying on the couch|taking it easy)\b"),
        (Activity::Sleeping, r"\b(sleep(ing)?|going to bed|falling asleep|bedtime|nap(ping)?)\b"),
        (Activity::Partying, r"\b(party(ing)?|pregame|celebrat(e|ing)|going out)\b"),
        (Activity::Cooking, r"\b(cook(ing)?|making dinner|baking)\b"),
        (Activity::Cleaning, r"\b(clean(ing)?|tidying|doing chores|laundry)\b"),
        (Activity::Reading, r"\b(reading|a book)\b"),
    ])
});

static TIMES: Lazy<Family<TimeOfDay>> = Lazy::new(|| {
    family(&[
        (TimeOfDay::Morning, r"\b(morning|breakfast|sunrise|just woke up)\b"),
        (TimeOfDay::Afternoon, r"\b(afternoon|lunch(time)?|midday)\b"),
        (TimeOfDay::Evening, r"\b(evening|dinner|sunset|after work)\b"),
        (TimeOfDay::Night, r"\b(tonight|night|midnight|late)\b"),
    ])
});

static SOCIAL: Lazy<Family<SocialContext>> = Lazy::new(|| {
    family(&[
        (SocialContext::Alone, r"\b(alone|by myself|on my own|solo)\b"),
        (SocialContext::WithFriends, r"\b(friends?|mates|buddies|the (guys|girls))\b"),
        (SocialContext::WithPartner, r"\b(partner|girlfriend|boyfriend|wife|husband|date|spouse)\b"),
        (SocialContext::WithFamily, r"\b(family|parents|mom|dad|kids|children|siblings?)\b"),
        (SocialContext::WithColleagues, r"\b(colleagues?|coworkers?|team|boss)\b"),
    ])
});

static LOCATIONS: Lazy<Family<Location>> = Lazy::new(|| {
    family(&[
        (Location::Home, r"\b(at home|home|my (room|bedroom|apartment|flat|place)|house)\b"),
        (Location::Work, r"\b(at work|office|workplace)\b"),
        (Location::Gym, r"\b(gym|fitness center)\b"),
        (Location::Car, r"\b(car|driving)\b"),
        (Location::Outdoors, r"\b(outside|outdoors|park|beach|hiking|forest)\b"),
        (Location::Cafe, r"\b(cafe|café|coffee shop|restaurant|bar)\b"),
        (Location::School, r"\b(school|campus|library|class(room)?|university|college)\b"),
        (Location::Transit, r"\b(bus|train|subway|metro|plane|airport)\b"),
    ])
});

fn first_match<T: Copy>(families: &Family<T>, text: &str) -> Option<T> {
    families
        .iter()
        .find(|(_, regex)| regex.is_match(text))
        .map(|(value, _)| *value)
}

/// Pulls activity, time, company and place out of a message.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextSignalExtractor;

impl ContextSignalExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str) -> ContextSignals {
        let text = normalize(text);
        ContextSignals {
            activity: first_match(&ACTIVITIES, &text),
            time_of_day: first_match(&TIMES, &text),
            social: first_match(&SOCIAL, &text),
            location: first_match(&LOCATIONS, &text),
        }
    }
}
