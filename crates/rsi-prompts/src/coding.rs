//! Coding task prompts
//!
//! One function per pipeline step. Structured steps embed the draft-07 schema
//! of the expected answer verbatim; code steps ask for a fenced Python block.

use serde::Serialize;

use crate::schema::{
    schema_text, Challenge, EvaluationFunctionVerdict, RankingVerdict, SelectedChallenge,
    SolutionRankingEntry,
};

/// System turn prepended to every request.
pub const SYSTEM_PROMPT: &str = "\
You are a component in a system of training exercises. You answer concisely without pleasantries.
You will produce either JSON responses without Markdown notation, or Python code in Markdown blocks.
";

const JSON_ONLY: &str = "Respond with raw JSON conforming to the following JSON Schema. \
Do not wrap the JSON in Markdown and do not add any text around it.";

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "[]".to_string())
}

#[derive(Serialize)]
struct NumberedArtifact<'a> {
    id: usize,
    #[serde(rename = "content")]
    body: &'a str,
}

fn numbered<'a>(artifacts: impl IntoIterator<Item = (usize, &'a str)>) -> String {
    let items: Vec<NumberedArtifact<'_>> = artifacts
        .into_iter()
        .map(|(id, body)| NumberedArtifact { id, body })
        .collect();
    pretty(&items)
}

fn numbered_in_order(artifacts: &[String]) -> String {
    numbered(artifacts.iter().map(String::as_str).enumerate())
}

fn numbered_by_id(artifacts: &[(usize, String)]) -> String {
    numbered(artifacts.iter().map(|(id, body)| (*id, body.as_str())))
}

/// Ask for `count` diverse programming challenges.
pub fn generate_challenges(count: usize) -> String {
    format!(
        "Write {count} programming challenges of easy and medium complexity. \
Cover a diverse range of subjects and make sure no two challenges are alike. \
Each challenge must be solvable with a single standalone Python function using only the standard library, \
and its description must be precise enough that correctness can be checked with assertions.
Give every challenge a short unique identifier.

{JSON_ONLY}

{schema}",
        schema = schema_text::<Vec<Challenge>>(),
    )
}

/// Ask for the best `top_n` challenges out of `challenges`, best first.
pub fn evaluate_challenges(challenges: &[Challenge], top_n: usize) -> String {
    let ids: Vec<&str> = challenges.iter().map(|c| c.id.as_str()).collect();
    format!(
        "Here is a list of programming challenges:

{challenges}

Pick the {top_n} challenges most worth pursuing as training exercises: \
well specified, testable, non-trivial and distinct from each other. \
Order them best first. Only use identifiers from this list: {ids}.

{JSON_ONLY}

{schema}",
        challenges = pretty(challenges),
        ids = ids.join(", "),
        schema = schema_text::<Vec<SelectedChallenge>>(),
    )
}

/// Ask for an evaluation function that checks solutions to `challenge`.
pub fn generate_evaluation_function(challenge: &Challenge) -> String {
    format!(
        "Here is a programming challenge:

{challenge}

Write a Python evaluation function `evaluate(solution)` that takes a candidate solution function \
and returns a score between 0.0 and 1.0 describing how correct the solution is. \
Cover ordinary inputs, edge cases and invalid inputs. \
Respond with the Python code only, in a single Markdown code block.",
        challenge = pretty(challenge),
    )
}

/// Ask a judge to pick the best evaluation function for a challenge.
///
/// Each function is shown under its generation-order id.
pub fn evaluate_evaluation_functions(
    description: &str,
    evaluation_functions: &[(usize, String)],
) -> String {
    format!(
        "Here is a programming challenge:

{description}

Here are candidate evaluation functions for solutions to this challenge:

{functions}

Pick the evaluation function that most thoroughly and correctly measures whether a solution \
solves the challenge. Explain your choice in the rationale.

{JSON_ONLY}

{schema}",
        functions = numbered_by_id(evaluation_functions),
        schema = schema_text::<EvaluationFunctionVerdict>(),
    )
}

/// Ask for a solution to `challenge` that will be scored by `evaluation_function`.
pub fn generate_solutions(challenge: &Challenge, evaluation_function: &str) -> String {
    format!(
        "Here is a programming challenge:

{challenge}

Solutions will be scored with this evaluation function:

{evaluation_function}

Write a Python function that solves the challenge. \
Respond with the Python code only, in a single Markdown code block.",
        challenge = pretty(challenge),
    )
}

/// Ask a judge to rank sample solutions, best first.
pub fn evaluate_solutions(
    challenge: &Challenge,
    evaluation_function: &str,
    solutions: &[(usize, String)],
) -> String {
    format!(
        "Here is a programming challenge:

{challenge}

Here is the evaluation function used to score solutions:

{evaluation_function}

Here are sample solutions:

{solutions}

Rank all sample solutions from best to worst by how well they would score with the evaluation \
function and how clearly they are written. Give a rationale for each position.

{JSON_ONLY}

{schema}",
        challenge = pretty(challenge),
        solutions = numbered_by_id(solutions),
        schema = schema_text::<Vec<SolutionRankingEntry>>(),
    )
}

/// Ask which of several judges' rankings is the most trustworthy.
///
/// Only candidate identifiers and the rendered rankings are shown, never the
/// candidates themselves, so the prompt stays bounded.
pub fn evaluate_rankings(task: &str, candidate_ids: &[String], rankings: &[String]) -> String {
    format!(
        "Several independent judges were asked to {task}. \
The candidates had these identifiers: {ids}.

Here are their rankings:

{rankings}

Judge which ranking is the most trustworthy: consistent, well reasoned and \
using only valid candidate identifiers. Answer with the identifier of the ranking, \
not of a candidate.

{JSON_ONLY}

{schema}",
        ids = candidate_ids.join(", "),
        rankings = numbered_in_order(rankings),
        schema = schema_text::<RankingVerdict>(),
    )
}

/// Ask which evaluation function ranking held up best once a solution was chosen.
pub fn review_evaluation_function_rankings(
    challenge: &Challenge,
    selected_solution: &str,
    rankings: &[String],
) -> String {
    format!(
        "Here is a programming challenge:

{challenge}

This solution was selected as the best one:

{selected_solution}

Earlier, independent judges ranked candidate evaluation functions for this challenge:

{rankings}

With the selected solution in mind, judge which of these rankings picked the evaluation function \
that best separates correct solutions from incorrect ones. Answer with the identifier of the ranking.

{JSON_ONLY}

{schema}",
        challenge = pretty(challenge),
        rankings = numbered_in_order(rankings),
        schema = schema_text::<RankingVerdict>(),
    )
}

/// Follow-up turn asking the model to restate a response that failed to parse.
pub fn correct_response(malformed_response: &str, error: &str) -> String {
    format!(
        "Your previous response could not be parsed:

{malformed_response}

Parse error: {error}

Answer the request above again. Keep the content of your previous answer, \
but emit only raw JSON that conforms exactly to the schema, without Markdown."
    )
}
