//! Search query construction
//!
//! Abstract vocabulary (greetings, pronouns, numbers, common verbs) searches
//! badly by its literal translation, so those words use a hand-written
//! query. Everything else gets a category hint.

/// Concrete queries keyed by normalized translation
const CONCRETE_QUERIES: &[(&str, &str)] = &[
    // Greetings and phrases
    ("hello", "people waving hello greeting friendly"),
    ("good morning", "sunrise morning greeting coffee wake up"),
    ("good afternoon", "afternoon sun people meeting"),
    ("good evening", "evening sunset dinner greeting"),
    ("good night", "night moon stars bedtime"),
    ("goodbye", "people waving goodbye farewell"),
    ("bye", "friends waving bye casual farewell"),
    ("see you later", "friends parting see you soon"),
    ("see you tomorrow", "calendar tomorrow planning meeting"),
    ("see you soon", "clock time soon meeting"),
    ("how are you", "people conversation friendly chat"),
    ("fine", "thumbs up okay happy person"),
    ("thank you", "grateful thankful appreciation handshake"),
    ("thanks", "thank you gratitude appreciation"),
    ("you're welcome", "welcoming friendly hospitality"),
    ("please", "polite request please manners"),
    ("excuse me", "polite apology excuse pardon"),
    ("sorry", "apologetic sorry regret"),
    ("yes", "thumbs up yes agreement nodding"),
    ("no", "no refusal head shake"),
    ("maybe", "thinking uncertain perhaps considering"),
    ("of course", "confident certain absolutely sure"),
    ("okay", "okay agreement thumbs up fine"),
    // Pronouns
    ("i", "person pointing self me individual"),
    ("you", "person pointing you conversation"),
    ("he", "man male person portrait"),
    ("she", "woman female person portrait"),
    ("it", "object thing item neutral"),
    ("we", "group people together team us"),
    ("they", "group people them others"),
    // Articles
    ("the", "specific item pointing definite"),
    ("a", "single one item object"),
    ("an", "single item object one"),
    // Numbers
    ("one", "number 1 one single item"),
    ("two", "number 2 two pair items"),
    ("three", "number 3 three items trio"),
    ("four", "number 4 four items"),
    ("five", "number 5 five items hand fingers"),
    ("six", "number 6 six items"),
    ("seven", "number 7 seven items"),
    ("eight", "number 8 eight items"),
    ("nine", "number 9 nine items"),
    ("ten", "number 10 ten items both hands"),
    // Verbs
    ("to be", "existence being identity person"),
    ("to have", "having possession holding hands"),
    ("to go", "walking going movement travel"),
    ("to come", "arriving coming approach"),
    ("to want", "desire wanting wish reaching"),
    ("to eat", "eating food meal dining"),
    ("to drink", "drinking beverage glass"),
    ("to sleep", "sleeping bed rest peaceful"),
    ("to speak", "speaking talking conversation"),
    ("to work", "working office job profession"),
];

/// Category hints, checked in order by substring of the category
const CATEGORY_HINTS: &[(&str, &str)] = &[
    ("greetings", "people greeting friendly interaction"),
    ("numbers", "number counting quantity clear"),
    ("family", "family portrait people relatives"),
    ("food", "food dish cuisine delicious"),
    ("transportation", "vehicle transport travel"),
    ("weather", "weather nature sky outdoor"),
    ("body", "human body anatomy health"),
    ("colors", "color vibrant colorful"),
    ("animals", "animal wildlife nature"),
    ("time", "clock time schedule"),
    ("calendar", "calendar date schedule"),
    ("verbs", "action movement doing"),
    ("adjectives", "quality characteristic"),
    ("pronouns", "person people portrait"),
];

/// Lesson id fragments mapped to categories, first match wins
const LESSON_CATEGORIES: &[(&[&str], &str)] = &[
    (&["greeting"], "greetings"),
    (&["number"], "numbers"),
    (&["family"], "family"),
    (&["food", "cafe"], "food"),
    (&["transport"], "transportation"),
    (&["weather"], "weather"),
    (&["body"], "body"),
    (&["color"], "colors"),
    (&["time"], "time"),
    (&["day", "month"], "calendar"),
    (&["verb"], "verbs"),
];

pub const GENERAL_CATEGORY: &str = "general";

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Concrete query for a translation in the lookup table
pub fn concrete_query(translation: &str) -> Option<&'static str> {
    let key = normalize(translation);
    CONCRETE_QUERIES
        .iter()
        .find(|(t, _)| *t == key)
        .map(|(_, query)| *query)
}

/// Primary search query for a word
///
/// Table entries win; otherwise the first category hint whose name occurs in
/// the category is appended. `general` and unknown categories fall through
/// to `"<translation> clear"`.
pub fn build_query(translation: &str, category: Option<&str>) -> String {
    if let Some(query) = concrete_query(translation) {
        return query.to_string();
    }

    let translation = translation.trim();
    let category = category.map(normalize).filter(|c| !c.is_empty());
    let category = category.as_deref().unwrap_or(GENERAL_CATEGORY);

    if category != GENERAL_CATEGORY {
        if let Some((_, hint)) = CATEGORY_HINTS.iter().find(|(name, _)| category.contains(name)) {
            return format!("{} {}", translation, hint);
        }
    }

    format!("{} clear", translation)
}

/// Ordered fallback queries tried when the primary query finds nothing
pub fn fallback_queries(translation: &str, category: Option<&str>) -> Vec<String> {
    let translation = translation.trim();
    let mut queries = vec![
        translation.to_string(),
        format!("{} illustration", translation),
        format!("{} concept", translation),
    ];

    let category = category.map(normalize).unwrap_or_default();
    if category.contains("greeting") {
        queries.push("people meeting friendly".to_string());
    } else if category.contains("number") {
        queries.push("counting numbers education".to_string());
    }

    queries
}

/// Category implied by a lesson identifier
pub fn category_for_lesson(lesson_id: &str) -> &'static str {
    let lesson = lesson_id.to_lowercase();
    LESSON_CATEGORIES
        .iter()
        .find(|(fragments, _)| fragments.iter().any(|f| lesson.contains(f)))
        .map(|(_, category)| *category)
        .unwrap_or(GENERAL_CATEGORY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_wins_over_category() {
        assert_eq!(build_query("Three", Some("numbers")), "number 3 three items trio");
        assert_eq!(build_query(" hello ", None), "people waving hello greeting friendly");
        assert_eq!(build_query("to eat", Some("food")), "eating food meal dining");
    }

    #[test]
    fn test_category_hints() {
        assert_eq!(build_query("apple", Some("Food")), "apple food dish cuisine delicious");
        assert_eq!(build_query("bus", Some("urban transportation")), "bus vehicle transport travel");
        assert_eq!(build_query("chair", Some("general")), "chair clear");
        assert_eq!(build_query("chair", None), "chair clear");
        assert_eq!(build_query("chair", Some("furniture")), "chair clear");
    }

    #[test]
    fn test_fallback_sequence() {
        assert_eq!(
            fallback_queries("twelve", Some("numbers")),
            vec![
                "twelve",
                "twelve illustration",
                "twelve concept",
                "counting numbers education"
            ]
        );
        assert_eq!(
            fallback_queries("howdy", Some("greetings")).last().map(String::as_str),
            Some("people meeting friendly")
        );
        assert_eq!(fallback_queries("chair", None).len(), 3);
    }

    #[test]
    fn test_category_for_lesson() {
        assert_eq!(category_for_lesson("lesson_01_greetings"), "greetings");
        assert_eq!(category_for_lesson("L03-Numbers"), "numbers");
        assert_eq!(category_for_lesson("lesson_05_cafe"), "food");
        assert_eq!(category_for_lesson("days_of_week"), "calendar");
        assert_eq!(category_for_lesson("lesson_09_misc"), GENERAL_CATEGORY);
    }
}
