use crate::error::CoreError;
use crate::llm::ChatModel;
use parley_db::answers::{self, AnswerRow};
use parley_db::{interviews, DbPool};
use parley_models::report::{
    Comparison, EvaluationReport, MasteryBar, PieSlice, RadarData, ReportComments, TrendPoint,
    UserOverview,
};
use std::collections::BTreeMap;

const DIMENSION_LABELS: [&str; 6] = [
    "专业知识水平",
    "技能匹配度",
    "语言表达能力",
    "逻辑思维能力",
    "创新能力",
    "应变抗压能力",
];

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Arithmetic means of the six ability dimensions, rescaled ×20 to the
/// percentile scale. Stable for a fixed answer set.
pub fn radar_from_answers(answers: &[AnswerRow]) -> RadarData {
    let mut sums = [0.0f64; 6];
    for answer in answers {
        for (sum, value) in sums.iter_mut().zip(answer.scores.ability_values()) {
            *sum += value;
        }
    }
    let n = answers.len().max(1) as f64;
    let mean = |i: usize| round1(sums[i] / n * 20.0);
    RadarData {
        professional_knowledge: mean(0),
        skill_matching: mean(1),
        communication: mean(2),
        logical_thinking: mean(3),
        innovation: mean(4),
        stress_handling: mean(5),
    }
}

/// Knowledge-point occurrence counts, most frequent first.
pub fn pie_from_answers(answers: &[AnswerRow]) -> Vec<PieSlice> {
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for answer in answers {
        for point in &answer.knowledge_points {
            *counts.entry(point.as_str()).or_default() += 1;
        }
    }
    let mut slices: Vec<PieSlice> = counts
        .into_iter()
        .map(|(name, count)| PieSlice {
            name: name.to_string(),
            count,
        })
        .collect();
    slices.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    slices
}

/// Per-point mastery: mean correctness over the answers carrying the point,
/// on the 0–100 scale.
pub fn mastery_from_answers(answers: &[AnswerRow]) -> Vec<MasteryBar> {
    let mut sums: BTreeMap<&str, (f64, i64)> = BTreeMap::new();
    for answer in answers {
        for point in &answer.knowledge_points {
            let entry = sums.entry(point.as_str()).or_default();
            entry.0 += answer.scores.correctness;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(name, (sum, count))| MasteryBar {
            name: name.to_string(),
            score: round1(sum / count as f64 / 5.0 * 100.0),
        })
        .collect()
}

/// Answers grouped by creation date, six ability dimensions averaged per
/// day, ×20. One point per distinct date, ascending.
pub fn trend_from_answers(answers: &[AnswerRow]) -> Vec<TrendPoint> {
    let mut days: BTreeMap<String, (f64, i64)> = BTreeMap::new();
    for answer in answers {
        let day = answer.created_at.format("%Y-%m-%d").to_string();
        let ability_mean: f64 = answer.scores.ability_values().iter().sum::<f64>() / 6.0;
        let entry = days.entry(day).or_default();
        entry.0 += ability_mean;
        entry.1 += 1;
    }
    days.into_iter()
        .map(|(date, (sum, count))| TrendPoint {
            date,
            score: round1(sum / count as f64 * 20.0),
        })
        .collect()
}

fn overall(radar: &RadarData) -> f64 {
    radar.values().iter().sum::<f64>() / 6.0
}

/// Deterministic comment fallbacks derived from dataset extrema.
pub fn fallback_comments(
    radar: &RadarData,
    pie: &[PieSlice],
    mastery: &[MasteryBar],
) -> ReportComments {
    let values = radar.values();
    let best = values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let worst = values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);

    let radar_comment = format!(
        "整体来看，{}表现最为突出，{}相对薄弱，建议针对性加强。",
        DIMENSION_LABELS[best], DIMENSION_LABELS[worst]
    );
    let pie_comment = match pie.first() {
        Some(top) => format!("本次面试考察最集中的知识点是「{}」。", top.name),
        None => "本次面试未标注具体知识点。".to_string(),
    };
    let mastery_comment = match mastery.iter().min_by(|a, b| a.score.total_cmp(&b.score)) {
        Some(weakest) => format!(
            "「{}」的掌握程度最低（{:.1}分），建议优先补强。",
            weakest.name, weakest.score
        ),
        None => "暂无知识点掌握度数据。".to_string(),
    };
    let summary = format!(
        "候选人在{}方面展现了较强能力；后续可围绕{}做刻意练习，并在回答中补充情境、任务、行动与结果的完整描述。",
        DIMENSION_LABELS[best], DIMENSION_LABELS[worst]
    );
    ReportComments {
        radar: radar_comment,
        pie: pie_comment,
        mastery: mastery_comment,
        summary,
    }
}

async fn llm_comments<C: ChatModel>(
    chat: &C,
    radar: &RadarData,
    pie: &[PieSlice],
    mastery: &[MasteryBar],
) -> Option<ReportComments> {
    let pie_text: Vec<String> = pie
        .iter()
        .take(8)
        .map(|s| format!("{}×{}", s.name, s.count))
        .collect();
    let mastery_text: Vec<String> = mastery
        .iter()
        .take(8)
        .map(|m| format!("{}:{:.1}", m.name, m.score))
        .collect();
    let prompt = format!(
        "以下是一次模拟面试的评估数据。六维能力（百分制）：专业知识{:.1}、技能匹配{:.1}、语言表达{:.1}、\
         逻辑思维{:.1}、创新{:.1}、应变抗压{:.1}。知识点分布：{}。知识点掌握度：{}。\n\
         请输出四行简短评语，格式严格为：\n\
         雷达图评语：...\n\
         知识点分布评语：...\n\
         掌握度评语：...\n\
         总结评语：...（用STAR法则视角点评并给出技术建议）",
        radar.professional_knowledge,
        radar.skill_matching,
        radar.communication,
        radar.logical_thinking,
        radar.innovation,
        radar.stress_handling,
        pie_text.join("，"),
        mastery_text.join("，"),
    );
    let response = chat.complete(&prompt).await.ok()?;
    let find = |prefix: &str| -> Option<String> {
        response.lines().find_map(|line| {
            line.trim()
                .strip_prefix(prefix)
                .map(|rest| rest.trim_start_matches(['：', ':']).trim().to_string())
        })
    };
    Some(ReportComments {
        radar: find("雷达图评语")?,
        pie: find("知识点分布评语")?,
        mastery: find("掌握度评语")?,
        summary: find("总结评语")?,
    })
}

/// Build the full evaluation report for an interview. `None`-like absence
/// of answers surfaces as `CoreError::NotFound`.
pub async fn evaluate<C: ChatModel>(
    db: &DbPool,
    chat: &C,
    interview_id: i64,
) -> Result<EvaluationReport, CoreError> {
    let Some(interview) = interviews::get_interview(db, interview_id).await? else {
        return Err(CoreError::NotFound);
    };
    let answer_rows = answers::list_for_interview(db, interview_id).await?;
    if answer_rows.is_empty() {
        return Err(CoreError::NotFound);
    }

    let radar = radar_from_answers(&answer_rows);
    let pie = pie_from_answers(&answer_rows);
    let mastery = mastery_from_answers(&answer_rows);
    let trend = trend_from_answers(&answer_rows);

    let comparison = match interviews::latest_prior_with_answers(
        db,
        interview.user_id,
        &interview.position_type,
        interview_id,
    )
    .await?
    {
        Some(prior) => {
            let prior_answers = answers::list_for_interview(db, prior.id).await?;
            let prior_radar = radar_from_answers(&prior_answers);
            let current = radar.values();
            let previous = prior_radar.values();
            let delta = |i: usize| round1(current[i] - previous[i]);
            Some(Comparison {
                previous_interview_id: prior.id,
                overall_delta: round1(overall(&radar) - overall(&prior_radar)),
                dimension_deltas: RadarData {
                    professional_knowledge: delta(0),
                    skill_matching: delta(1),
                    communication: delta(2),
                    logical_thinking: delta(3),
                    innovation: delta(4),
                    stress_handling: delta(5),
                },
            })
        }
        None => None,
    };

    let comments = match llm_comments(chat, &radar, &pie, &mastery).await {
        Some(comments) => comments,
        None => fallback_comments(&radar, &pie, &mastery),
    };

    Ok(EvaluationReport {
        interview_id,
        total_answers: answer_rows.len() as i64,
        radar,
        pie,
        mastery,
        trend,
        comparison,
        comments,
    })
}

/// Aggregate ability means across everything the user has answered.
pub async fn user_overview(db: &DbPool, user_id: i64) -> Result<UserOverview, CoreError> {
    let answer_rows = answers::list_for_user(db, user_id).await?;
    if answer_rows.is_empty() {
        return Err(CoreError::NotFound);
    }
    let total_interviews = {
        let mut ids: Vec<i64> = answer_rows.iter().map(|a| a.interview_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len() as i64
    };
    Ok(UserOverview {
        total_interviews,
        total_answers: answer_rows.len() as i64,
        radar: radar_from_answers(&answer_rows),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_models::answer::RubricScores;

    fn answer(
        professional: f64,
        correctness: f64,
        points: &[&str],
        created_at: &str,
    ) -> AnswerRow {
        AnswerRow {
            id: uuid::Uuid::new_v4().to_string(),
            interview_id: 1,
            question_index: 0,
            question: "问题".to_string(),
            answer: "回答".to_string(),
            knowledge_points: points.iter().map(|p| p.to_string()).collect(),
            clip_path: None,
            scores: RubricScores {
                professional_knowledge: professional,
                correctness,
                ..RubricScores::neutral()
            },
            ai_analysis: None,
            created_at: chrono::DateTime::parse_from_rfc3339(created_at)
                .expect("timestamp")
                .with_timezone(&chrono::Utc),
        }
    }

    #[test]
    fn radar_rescales_means_by_twenty() {
        let rows = vec![
            answer(3.0, 3.0, &[], "2026-03-01T09:00:00Z"),
            answer(4.0, 3.0, &[], "2026-03-01T09:05:00Z"),
            answer(5.0, 3.0, &[], "2026-03-01T09:10:00Z"),
        ];
        let radar = radar_from_answers(&rows);
        assert_eq!(radar.professional_knowledge, 80.0);
        assert_eq!(radar.communication, 60.0);
    }

    #[test]
    fn pie_counts_every_unique_point() {
        let rows = vec![
            answer(3.0, 3.0, &["数据库", "索引"], "2026-03-01T09:00:00Z"),
            answer(3.0, 3.0, &["数据库"], "2026-03-01T09:05:00Z"),
        ];
        let pie = pie_from_answers(&rows);
        assert_eq!(pie.len(), 2);
        assert_eq!(pie[0].name, "数据库");
        assert_eq!(pie[0].count, 2);
        assert_eq!(pie[1].count, 1);
    }

    #[test]
    fn mastery_is_mean_correctness_over_five() {
        let rows = vec![
            answer(3.0, 4.0, &["数据库"], "2026-03-01T09:00:00Z"),
            answer(3.0, 2.0, &["数据库"], "2026-03-01T09:05:00Z"),
        ];
        let mastery = mastery_from_answers(&rows);
        assert_eq!(mastery.len(), 1);
        assert_eq!(mastery[0].score, 60.0);
    }

    #[test]
    fn trend_groups_by_creation_date() {
        let rows = vec![
            answer(3.0, 3.0, &[], "2026-03-01T09:00:00Z"),
            answer(5.0, 3.0, &[], "2026-03-01T10:00:00Z"),
            answer(4.0, 3.0, &[], "2026-03-02T09:00:00Z"),
        ];
        let trend = trend_from_answers(&rows);
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].date, "2026-03-01");
        assert_eq!(trend[1].date, "2026-03-02");
        // Day one: per-answer ability means (3+3+3+3+3+3)/6 = 3.0 and 20/6.
        let day_one = ((3.0 + 20.0 / 6.0) / 2.0 * 20.0 * 10.0_f64).round() / 10.0;
        assert_eq!(trend[0].score, day_one);
    }

    #[test]
    fn repeated_aggregation_is_stable() {
        let rows = vec![
            answer(4.0, 5.0, &["索引", "事务"], "2026-03-01T09:00:00Z"),
            answer(2.0, 1.0, &["事务"], "2026-03-02T09:00:00Z"),
        ];
        assert_eq!(radar_from_answers(&rows), radar_from_answers(&rows));
        assert_eq!(pie_from_answers(&rows), pie_from_answers(&rows));
        assert_eq!(mastery_from_answers(&rows), mastery_from_answers(&rows));
        assert_eq!(trend_from_answers(&rows), trend_from_answers(&rows));
    }

    #[test]
    fn fallback_comments_name_extrema() {
        let rows = vec![answer(5.0, 4.0, &["数据库"], "2026-03-01T09:00:00Z")];
        let radar = radar_from_answers(&rows);
        let comments =
            fallback_comments(&radar, &pie_from_answers(&rows), &mastery_from_answers(&rows));
        assert!(comments.radar.contains("专业知识水平"));
        assert!(comments.pie.contains("数据库"));
        assert!(!comments.summary.is_empty());
    }

    struct DownChat;

    impl crate::llm::ChatModel for DownChat {
        async fn complete(&self, _prompt: &str) -> Result<String, CoreError> {
            Err(CoreError::Llm("unavailable".to_string()))
        }

        async fn complete_with_video(
            &self,
            _prompt: &str,
            _video_b64: Option<String>,
        ) -> Result<String, CoreError> {
            Err(CoreError::Llm("unavailable".to_string()))
        }
    }

    async fn seed_interview_with_answer(
        db: &DbPool,
        user_id: i64,
        professional: f64,
    ) -> i64 {
        let interview = interviews::create_interview(
            db,
            user_id,
            None,
            chrono::Utc::now(),
            "后端开发",
            "",
            "",
            "backend",
        )
        .await
        .expect("interview");
        let id = uuid::Uuid::new_v4().to_string();
        answers::create_answer(db, &id, interview.id, 1, "问题", "回答", &["数据库".to_string()])
            .await
            .expect("answer");
        let scores = parley_models::answer::RubricScores {
            professional_knowledge: professional,
            ..parley_models::answer::RubricScores::neutral()
        };
        answers::update_scores(db, &id, &scores, "评语")
            .await
            .expect("scores");
        interview.id
    }

    #[tokio::test]
    async fn evaluation_compares_against_the_prior_interview() {
        let db = parley_db::create_pool("sqlite::memory:", 1)
            .await
            .expect("pool");
        parley_db::run_migrations(&db).await.expect("migrations");

        let earlier = seed_interview_with_answer(&db, 1, 3.0).await;
        let later = seed_interview_with_answer(&db, 1, 4.0).await;

        let report = evaluate(&db, &DownChat, later).await.expect("report");
        let comparison = report.comparison.expect("has prior interview");
        assert_eq!(comparison.previous_interview_id, earlier);
        // professional: 80 - 60 = +20, spread over six dimensions.
        assert_eq!(comparison.dimension_deltas.professional_knowledge, 20.0);
        assert!((comparison.overall_delta - 20.0 / 6.0).abs() < 0.1);

        let first_report = evaluate(&db, &DownChat, earlier).await.expect("report");
        assert!(first_report.comparison.is_none());
    }

    #[tokio::test]
    async fn evaluation_without_answers_is_not_found() {
        let db = parley_db::create_pool("sqlite::memory:", 1)
            .await
            .expect("pool");
        parley_db::run_migrations(&db).await.expect("migrations");
        let interview = interviews::create_interview(
            &db,
            1,
            None,
            chrono::Utc::now(),
            "后端开发",
            "",
            "",
            "backend",
        )
        .await
        .expect("interview");

        let result = evaluate(&db, &DownChat, interview.id).await;
        assert!(matches!(result, Err(CoreError::NotFound)));
    }
}
