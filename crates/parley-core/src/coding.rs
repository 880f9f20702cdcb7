use parley_db::coding::CodingProblemRow;
use parley_models::interview::{PositionType, ResumeProfile};
use parley_models::problem::Difficulty;
use rand::Rng;

const TAG_MATCH_WEIGHT: i64 = 10;
const COMPANY_MATCH_WEIGHT: i64 = 20;

/// Pick `limit` coding problems for an interview, scored by tag and company
/// affinity with the résumé, with a small random jitter for variety.
pub fn select_problems(
    problems: Vec<CodingProblemRow>,
    position_type: PositionType,
    resume: &ResumeProfile,
    limit: usize,
) -> Vec<CodingProblemRow> {
    let mut rng = rand::thread_rng();
    select_problems_with(problems, position_type, resume, limit, |_| {
        rng.gen_range(0..=5)
    })
}

/// Deterministic core, jitter injected for testability.
pub fn select_problems_with<F>(
    problems: Vec<CodingProblemRow>,
    position_type: PositionType,
    resume: &ResumeProfile,
    limit: usize,
    mut jitter: F,
) -> Vec<CodingProblemRow>
where
    F: FnMut(&CodingProblemRow) -> i64,
{
    // Problems scoped to this position type; an empty match opens the full set.
    let mut candidates: Vec<CodingProblemRow> = problems
        .iter()
        .filter(|p| p.position_types.iter().any(|t| t == position_type.as_str()))
        .cloned()
        .collect();
    if candidates.is_empty() {
        candidates = problems;
    }

    let preferred = difficulty_preference(resume);
    let at_preference: Vec<CodingProblemRow> = candidates
        .iter()
        .filter(|p| Difficulty::parse(&p.difficulty) == preferred)
        .cloned()
        .collect();
    if !at_preference.is_empty() {
        candidates = at_preference;
    }

    let preferences = tag_preferences(resume, position_type);
    let mut scored: Vec<(i64, CodingProblemRow)> = candidates
        .into_iter()
        .map(|problem| {
            let score = problem_score(&problem, &preferences, resume) + jitter(&problem);
            (score, problem)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.number.cmp(&b.1.number)));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, problem)| problem)
        .collect()
}

/// 0 experiences → easy; 1–2 → medium; 3+ → hard.
pub fn difficulty_preference(resume: &ResumeProfile) -> Difficulty {
    let total = resume.work_experiences.len() + resume.project_experiences.len();
    match total {
        0 => Difficulty::Easy,
        1..=2 => Difficulty::Medium,
        _ => Difficulty::Hard,
    }
}

/// Position-type baseline tags plus keyword-derived tags from the résumé's
/// expected position.
pub fn tag_preferences(resume: &ResumeProfile, position_type: PositionType) -> Vec<String> {
    let baseline: &[&str] = match position_type {
        PositionType::Backend => &["数组", "字符串", "哈希表", "栈", "队列", "链表", "树", "数据库"],
        PositionType::Frontend => &["数组", "字符串", "哈希表", "树", "DOM", "算法"],
        PositionType::Algo => &["动态规划", "贪心", "回溯", "分治", "图", "树", "数学"],
        PositionType::Pm => &["逻辑", "数学", "概率"],
        PositionType::Qa => &["逻辑", "边界条件", "测试"],
        _ => &["数组", "字符串"],
    };
    let mut preferences: Vec<String> = baseline.iter().map(|t| t.to_string()).collect();

    let expected = resume.expected_position.to_lowercase();
    if expected.contains("java") {
        preferences.extend(["面向对象".to_string(), "Java".to_string()]);
    }
    if expected.contains("python") {
        preferences.extend(["Python".to_string(), "脚本".to_string()]);
    }
    if expected.contains("react") || expected.contains("vue") {
        preferences.extend(["前端".to_string(), "JavaScript".to_string()]);
    }

    preferences.dedup();
    preferences
}

fn problem_score(
    problem: &CodingProblemRow,
    preferences: &[String],
    resume: &ResumeProfile,
) -> i64 {
    let tag_matches = problem
        .tags
        .iter()
        .filter(|tag| preferences.contains(tag))
        .count() as i64;
    let company_matches = resume
        .work_experiences
        .iter()
        .filter(|exp| {
            !exp.company_name.is_empty() && problem.companies.contains(&exp.company_name)
        })
        .count() as i64;
    tag_matches * TAG_MATCH_WEIGHT + company_matches * COMPANY_MATCH_WEIGHT
}
