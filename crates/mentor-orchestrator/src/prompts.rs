//! Prompt assembly for the three generation stages.
//!
//! Prompts are plain strings. Durations and counts mentioned here are
//! instructions to the model only; nothing downstream enforces them.

use std::fmt::Write;

use crate::course::{CourseContext, LearnerProfile, LessonOutline, LessonType, ModuleOutline};

/// Instructions used when the caller gives none.
pub const NO_SPECIAL_INSTRUCTIONS: &str = "No special instructions";

/// Builds the syllabus prompt for a topic.
#[must_use]
pub fn syllabus_prompt(topic: &str, profile: &LearnerProfile, instructions: &str) -> String {
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You are an expert curriculum architect. Design a structured course on the topic: {topic}\n"
    );
    let _ = writeln!(prompt, "Learner Profile:");
    let _ = writeln!(prompt, "- Skill Level: {}", profile.skill_level);
    let _ = writeln!(prompt, "- Learning Style: {}", profile.learning_style);
    let _ = writeln!(
        prompt,
        "- Time Commitment: {} hours per week",
        profile.time_commitment
    );
    let _ = writeln!(
        prompt,
        "- Prior Knowledge: {}\n",
        profile.prior_knowledge_summary()
    );
    let _ = writeln!(prompt, "Instructions: {instructions}\n");
    let _ = writeln!(prompt, "Requirements:");
    let _ = writeln!(prompt, "- Total course duration between 10 and 100 hours");
    let _ = writeln!(prompt, "- Break the topic into logical modules with progressive difficulty");
    let _ = writeln!(prompt, "- Give every module a short unique id such as \"module_1\"");
    let _ = writeln!(
        prompt,
        "- List in \"dependencies\" only ids of earlier modules of this course, never forming a cycle"
    );
    let _ = writeln!(prompt, "- Include concrete learning objectives for each module\n");
    let _ = writeln!(
        prompt,
        "Respond with a single JSON object and nothing else, using this structure:"
    );
    prompt.push_str(
        r#"{
  "course_title": "...",
  "estimated_duration": 40,
  "difficulty_level": "intermediate",
  "prerequisites": ["..."],
  "modules": [
    {
      "id": "module_1",
      "title": "...",
      "description": "...",
      "learning_objectives": ["..."],
      "estimated_duration": 6,
      "dependencies": []
    }
  ]
}
"#,
    );

    prompt
}

/// Builds the prompt that expands one module into lesson outlines.
#[must_use]
pub fn module_structure_prompt(module: &ModuleOutline, context: &CourseContext) -> String {
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You are an expert instructional designer. Break one module of a course into lessons.\n"
    );
    write_course_context(&mut prompt, context);
    let _ = writeln!(prompt, "Module:");
    let _ = writeln!(prompt, "- Title: {}", module.title);
    let _ = writeln!(prompt, "- Description: {}", module.description);
    let _ = writeln!(
        prompt,
        "- Learning Objectives: {}",
        module.learning_objectives.join("; ")
    );
    let _ = writeln!(
        prompt,
        "- Estimated Duration: {} hours\n",
        module.estimated_duration
    );
    let _ = writeln!(prompt, "Requirements:");
    let _ = writeln!(prompt, "- Between 3 and 8 lessons, each taking 15 to 60 minutes");
    let _ = writeln!(prompt, "- Lesson \"type\" must be one of: theory, practice, assessment");
    let _ = writeln!(prompt, "- Lesson ids must be unique within the module, e.g. \"lesson_1\"");
    let _ = writeln!(prompt, "- Order lessons so each builds on the previous ones\n");
    let _ = writeln!(
        prompt,
        "Respond with a single JSON object and nothing else, using this structure:"
    );
    prompt.push_str(
        r#"{
  "lessons": [
    {
      "id": "lesson_1",
      "title": "...",
      "type": "theory",
      "key_concepts": ["..."],
      "difficulty": "intermediate"
    }
  ]
}
"#,
    );

    prompt
}

/// Builds the content prompt for one lesson.
#[must_use]
pub fn lesson_prompt(
    lesson: &LessonOutline,
    context: &CourseContext,
    profile: Option<&LearnerProfile>,
) -> String {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "Generate a complete lesson for an educational course.\n");
    write_course_context(&mut prompt, context);

    if let Some(profile) = profile {
        let _ = writeln!(prompt, "Learner:");
        let _ = writeln!(prompt, "- Skill Level: {}", profile.skill_level);
        let _ = writeln!(prompt, "- Learning Style: {}", profile.learning_style);
        let _ = writeln!(
            prompt,
            "- Prior Knowledge: {}\n",
            profile.prior_knowledge_summary()
        );
    }

    let _ = writeln!(prompt, "Lesson Details:");
    let _ = writeln!(prompt, "- Title: {}", lesson.title);
    let _ = writeln!(prompt, "- Type: {}", lesson.lesson_type);
    let _ = writeln!(prompt, "- Key Concepts: {}", lesson.key_concepts.join(", "));
    let _ = writeln!(prompt, "- Difficulty: {}\n", lesson.difficulty);
    let _ = writeln!(prompt, "{}\n", lesson_instructions(&lesson.lesson_type));
    let _ = write!(prompt, "Generate the complete lesson content in markdown now.");

    prompt
}

/// Type-specific instruction block for lesson content.
#[must_use]
pub const fn lesson_instructions(lesson_type: &LessonType) -> &'static str {
    match lesson_type {
        LessonType::Theory => {
            "Instructions for a theory lesson:
- Write 800 to 1200 words of explanatory material
- Structure it with markdown headers and sections
- Explain each concept with real-world examples and use cases
- Only include code when it directly illustrates a key concept
- Finish with a summary of the key takeaways"
        }
        LessonType::Practice => {
            "Instructions for a practice lesson:
- Create 2 to 3 hands-on exercises that apply the key concepts
- Give each exercise clear instructions, starter code where useful and the expected outcome
- Provide step-by-step guidance and hints for common pitfalls
- Make each exercise build on the previous one in complexity"
        }
        LessonType::Assessment => {
            "Instructions for an assessment lesson:
- Write 5 to 7 questions that test the key concepts
- Mix formats: multiple choice, short answer and practical problems
- Give a time estimate for each question
- Include an explanation for every answer
- Keep questions challenging but fair for the difficulty level"
        }
        LessonType::Other(_) => {
            "Generate lesson content appropriate to the lesson type and the course context."
        }
    }
}

fn write_course_context(prompt: &mut String, context: &CourseContext) {
    let _ = writeln!(prompt, "Course Context:");
    let _ = writeln!(prompt, "- Course: {}", context.course_title);
    let _ = writeln!(prompt, "- Domain: {}", context.topic_domain);
    let _ = writeln!(prompt, "- Difficulty: {}", context.difficulty_level);
    let _ = writeln!(
        prompt,
        "- Special Instructions: {}\n",
        context.user_instructions.as_deref().unwrap_or("None")
    );
}
