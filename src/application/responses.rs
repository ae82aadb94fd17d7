//! Bot reply templates.
//!
//! English and Spanish; any other locale falls back to English. Probing
//! questions come from the question bank, everything else is composed here.

use crate::domain::conversation::Song;
use crate::domain::dialogue::{Activity, ContextSignals, Location, SocialContext, TimeOfDay};
use crate::domain::emotion::Mood;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lang {
    En,
    Es,
}

impl Lang {
    fn from_locale(locale: &str) -> Self {
        let primary = locale
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if primary == "es" {
            Lang::Es
        } else {
            Lang::En
        }
    }
}

pub fn greeting(locale: &str) -> String {
    match Lang::from_locale(locale) {
        Lang::En => "Hi! How are you feeling right now?",
        Lang::Es => "¡Hola! ¿Cómo te sientes ahora mismo?",
    }
    .to_string()
}

pub fn help(locale: &str) -> String {
    match Lang::from_locale(locale) {
        Lang::En => {
            "Tell me how you feel, in your own words, and I'll find songs that fit. \
             You can also ask for music directly, like \"play something calm\"."
        }
        Lang::Es => {
            "Cuéntame cómo te sientes, con tus propias palabras, y buscaré canciones que encajen. \
             También puedes pedir música directamente, por ejemplo \"pon algo tranquilo\"."
        }
    }
    .to_string()
}

pub fn reprompt(locale: &str) -> String {
    match Lang::from_locale(locale) {
        Lang::En => "Sorry, I didn't quite get that. Could you say it another way?",
        Lang::Es => "Perdona, no lo he entendido. ¿Puedes decirlo de otra forma?",
    }
    .to_string()
}

/// Used when the mood could not be read for this message.
pub fn mood_unclear(locale: &str) -> String {
    match Lang::from_locale(locale) {
        Lang::En => "I'm not sure I caught how you're feeling. Could you tell me a bit more?",
        Lang::Es => "No estoy seguro de haber entendido cómo te sientes. ¿Me cuentas un poco más?",
    }
    .to_string()
}

/// Short lead-in placed before a probing question.
pub fn acknowledgement(mood: Mood, locale: &str) -> String {
    match (Lang::from_locale(locale), mood.is_expressive()) {
        (Lang::En, true) => format!("Thanks for sharing. It sounds like you're feeling {}.", mood),
        (Lang::En, false) => "Thanks for sharing.".to_string(),
        (Lang::Es, true) => format!(
            "Gracias por contármelo. Parece que te sientes {}.",
            mood_es(mood)
        ),
        (Lang::Es, false) => "Gracias por contármelo.".to_string(),
    }
}

/// Read-back of the mood and context understood so far.
pub fn readback(mood: Mood, signals: &ContextSignals, locale: &str) -> String {
    let lang = Lang::from_locale(locale);
    let details = context_phrases(signals, lang);
    let mood_word = match lang {
        Lang::En => mood.as_str().to_string(),
        Lang::Es => mood_es(mood).to_string(),
    };
    match (lang, details.is_empty()) {
        (Lang::En, true) => format!("So you're feeling {}.", mood_word),
        (Lang::En, false) => format!("So you're feeling {}, {}.", mood_word, details.join(", ")),
        (Lang::Es, true) => format!("Entonces te sientes {}.", mood_word),
        (Lang::Es, false) => format!("Entonces te sientes {}, {}.", mood_word, details.join(", ")),
    }
}

pub fn confirm_fallback(locale: &str) -> String {
    match Lang::from_locale(locale) {
        Lang::En => "Does that sound right?",
        Lang::Es => "¿Te parece correcto?",
    }
    .to_string()
}

pub fn recommendation(mood: Mood, songs: &[Song], locale: &str) -> String {
    let lang = Lang::from_locale(locale);
    let list = songs
        .iter()
        .map(|song| format!("\"{}\" by {}", song.title, song.artist))
        .collect::<Vec<_>>()
        .join("; ");
    match lang {
        Lang::En => format!(
            "Here are some songs for when you're feeling {}: {}. Want something different?",
            mood, list
        ),
        Lang::Es => format!(
            "Aquí tienes algunas canciones para cuando te sientes {}: {}. ¿Quieres algo distinto?",
            mood_es(mood),
            list
        ),
    }
}

pub fn farewell(locale: &str) -> String {
    match Lang::from_locale(locale) {
        Lang::En => "Take care! Come back whenever you want more music.",
        Lang::Es => "¡Cuídate! Vuelve cuando quieras más música.",
    }
    .to_string()
}

/// Generic picks used when the recommender is unavailable.
pub fn fallback_songs() -> Vec<Song> {
    vec![
        Song::new("fallback-1", "Here Comes the Sun", "The Beatles"),
        Song::new("fallback-2", "Lovely Day", "Bill Withers"),
        Song::new("fallback-3", "Three Little Birds", "Bob Marley & The Wailers"),
    ]
}

fn mood_es(mood: Mood) -> &'static str {
    match mood {
        Mood::Happy => "feliz",
        Mood::Sad => "triste",
        Mood::Energetic => "con energía",
        Mood::Calm => "tranquilo",
        Mood::Angry => "enfadado",
        Mood::Anxious => "ansioso",
        Mood::Romantic => "romántico",
        Mood::Nostalgic => "nostálgico",
        Mood::Focused => "concentrado",
        Mood::Neutral => "neutral",
    }
}

fn context_phrases(signals: &ContextSignals, lang: Lang) -> Vec<&'static str> {
    let mut phrases = Vec::new();
    if let Some(location) = signals.location {
        phrases.push(location_phrase(location, lang));
    }
    if let Some(social) = signals.social {
        phrases.push(social_phrase(social, lang));
    }
    if let Some(activity) = signals.activity {
        phrases.push(activity_phrase(activity, lang));
    }
    if let Some(time) = signals.time_of_day {
        phrases.push(time_phrase(time, lang));
    }
    phrases
}

fn location_phrase(location: Location, lang: Lang) -> &'static str {
    match (location, lang) {
        (Location::Home, Lang::En) => "at home",
        (Location::Home, Lang::Es) => "en casa",
        (Location::Work, Lang::En) => "at work",
        (Location::Work, Lang::Es) => "en el trabajo",
        (Location::Gym, Lang::En) => "at the gym",
        (Location::Gym, Lang::Es) => "en el gimnasio",
        (Location::Car, Lang::En) => "in the car",
        (Location::Car, Lang::Es) => "en el coche",
        (Location::Outdoors, Lang::En) => "outdoors",
        (Location::Outdoors, Lang::Es) => "al aire libre",
        (Location::Cafe, Lang::En) => "at a cafe",
        (Location::Cafe, Lang::Es) => "en una cafetería",
        (Location::School, Lang::En) => "at school",
        (Location::School, Lang::Es) => "en clase",
        (Location::Transit, Lang::En) => "on the move",
        (Location::Transit, Lang::Es) => "en transporte público",
    }
}

fn social_phrase(social: SocialContext, lang: Lang) -> &'static str {
    match (social, lang) {
        (SocialContext::Alone, Lang::En) => "on your own",
        (SocialContext::Alone, Lang::Es) => "a solas",
        (SocialContext::WithFriends, Lang::En) => "with friends",
        (SocialContext::WithFriends, Lang::Es) => "con amigos",
        (SocialContext::WithPartner, Lang::En) => "with your partner",
        (SocialContext::WithPartner, Lang::Es) => "con tu pareja",
        (SocialContext::WithFamily, Lang::En) => "with family",
        (SocialContext::WithFamily, Lang::Es) => "con tu familia",
        (SocialContext::WithColleagues, Lang::En) => "with colleagues",
        (SocialContext::WithColleagues, Lang::Es) => "con compañeros",
    }
}

fn activity_phrase(activity: Activity, lang: Lang) -> &'static str {
    match (activity, lang) {
        (Activity::Workout, Lang::En) => "while working out",
        (Activity::Workout, Lang::Es) => "mientras entrenas",
        (Activity::Studying, Lang::En) => "while studying",
        (Activity::Studying, Lang::Es) => "mientras estudias",
        (Activity::Working, Lang::En) => "while working",
        (Activity::Working, Lang::Es) => "mientras trabajas",
        (Activity::Commuting, Lang::En) => "on your commute",
        (Activity::Commuting, Lang::Es) => "de camino",
        (Activity::Relaxing, Lang::En) => "while relaxing",
        (Activity::Relaxing, Lang::Es) => "mientras descansas",
        (Activity::Sleeping, Lang::En) => "winding down for sleep",
        (Activity::Sleeping, Lang::Es) => "antes de dormir",
        (Activity::Partying, Lang::En) => "at a party",
        (Activity::Partying, Lang::Es) => "de fiesta",
        (Activity::Cooking, Lang::En) => "while cooking",
        (Activity::Cooking, Lang::Es) => "mientras cocinas",
        (Activity::Cleaning, Lang::En) => "while cleaning",
        (Activity::Cleaning, Lang::Es) => "mientras limpias",
        (Activity::Reading, Lang::En) => "while reading",
        (Activity::Reading, Lang::Es) => "mientras lees",
    }
}

fn time_phrase(time: TimeOfDay, lang: Lang) -> &'static str {
    match (time, lang) {
        (TimeOfDay::Morning, Lang::En) => "this morning",
        (TimeOfDay::Morning, Lang::Es) => "esta mañana",
        (TimeOfDay::Afternoon, Lang::En) => "this afternoon",
        (TimeOfDay::Afternoon, Lang::Es) => "esta tarde",
        (TimeOfDay::Evening, Lang::En) => "this evening",
        (TimeOfDay::Evening, Lang::Es) => "esta noche",
        (TimeOfDay::Night, Lang::En) => "tonight",
        (TimeOfDay::Night, Lang::Es) => "de noche",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_locales_fall_back_to_english() {
        assert_eq!(greeting("fr"), greeting("en"));
        assert_eq!(greeting("es-MX"), greeting("es"));
        assert_ne!(greeting("es"), greeting("en"));
    }

    #[test]
    fn readback_lists_known_context() {
        let signals = ContextSignals {
            location: Some(Location::Home),
            social: Some(SocialContext::Alone),
            ..Default::default()
        };
        assert_eq!(
            readback(Mood::Sad, &signals, "en"),
            "So you're feeling sad, at home, on your own."
        );
        assert_eq!(
            readback(Mood::Sad, &ContextSignals::default(), "en"),
            "So you're feeling sad."
        );
    }

    #[test]
    fn recommendation_names_every_song() {
        let text = recommendation(Mood::Happy, &fallback_songs(), "en");
        for song in fallback_songs() {
            assert!(text.contains(&song.title));
        }
    }

    #[test]
    fn acknowledgement_skips_neutral_mood() {
        assert_eq!(acknowledgement(Mood::Neutral, "en"), "Thanks for sharing.");
        assert!(acknowledgement(Mood::Sad, "en").contains("sad"));
    }
}
