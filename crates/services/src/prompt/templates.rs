//! Fixed instruction templates sent to the text transformer.

pub fn improve_system_prompt(context: Option<&str>) -> String {
    let mut system = String::from(
        "You are an expert prompt engineer. Your task is to take user prompts and improve them \
         to be more effective for language models.\n\
         Focus on:\n\
         - Clarity: Make the intent crystal clear\n\
         - Specificity: Add necessary details and constraints\n\
         - Structure: Organize the prompt logically\n\
         - Context: Ensure sufficient background is provided\n",
    );

    if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
        system.push_str("\nAdditional context: ");
        system.push_str(context);
        system.push('\n');
    }

    system.push_str("\nReturn ONLY the improved prompt, no explanations or commentary.");
    system
}

pub fn analyze_user_prompt(prompt: &str) -> String {
    format!(
        "Analyze this prompt and provide a detailed analysis in JSON format with the following structure:\n\
         {{\n  \"clarity\": <score 0-100>,\n  \"specificity\": <score 0-100>,\n  \
         \"contextCompleteness\": <score 0-100>,\n  \"overall\": <score 0-100>,\n  \
         \"suggestions\": [<array of improvement suggestions>]\n}}\n\n\
         Prompt to analyze:\n\"{prompt}\"\n\n\
         Respond ONLY with valid JSON, no additional text."
    )
}

pub fn variations_user_prompt(prompt: &str, count: u32) -> String {
    format!(
        "Generate {count} different variations of this prompt, each optimized for different use \
         cases or approaches.\n\
         Each variation should maintain the core intent but approach it differently.\n\n\
         Original prompt:\n\"{prompt}\"\n\n\
         Return ONLY a JSON object like: {{\"variations\": [\"variation1\", \"variation2\"]}}\n\
         No additional text or explanations."
    )
}
