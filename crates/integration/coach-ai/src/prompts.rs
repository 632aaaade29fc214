//! Coaching prompts.

/// Fixed system prompt for every coaching call
pub const SYSTEM_PROMPT: &str = "You are a certified home fitness and nutrition coach focused on safe, \
sustainable weight loss without gym equipment. \
No extreme calorie cuts, no medical claims, no eating disorder language. \
Adjust calories only by 100-150 kcal when needed. \
Use a playful, encouraging tone and keep replies short.";

pub fn weekly_plan(goal: &str, preferences: &[String]) -> String {
    format!(
        "Create a 7-day home workout plan with a daily calorie target. Goal: {}. Preferences: {}. Include a habit checklist.",
        goal.trim(),
        preferences.join(", ")
    )
}

pub fn adjust_plan(feedback: &str) -> String {
    format!(
        "Adjust the plan based on feedback: {}. Provide a brief summary of changes and new calorie target.",
        feedback.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekly_plan_prompt() {
        let prompt = weekly_plan(" lose 5kg ", &["vegetarian".to_string(), "no jumping".to_string()]);
        assert!(prompt.contains("Goal: lose 5kg."));
        assert!(prompt.contains("Preferences: vegetarian, no jumping."));
    }

    #[test]
    fn test_adjust_plan_prompt() {
        assert!(adjust_plan("too hard").starts_with("Adjust the plan based on feedback: too hard."));
    }
}
