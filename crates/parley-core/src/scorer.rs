use crate::error::CoreError;
use crate::llm::ChatModel;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parley_asr::offline::OfflineTranscriber;
use parley_db::{answers, DbPool};
use parley_models::answer::RubricScores;
use std::path::Path;

/// Rubric prompt: seven dimensions with 1–5 anchors, the question's
/// knowledge points, and a fixed per-line output format the parser relies on.
pub fn scoring_prompt(question: &str, answer: &str, knowledge_points: &[String]) -> String {
    let points = if knowledge_points.is_empty() {
        "通用技能".to_string()
    } else {
        knowledge_points.join("、")
    };
    format!(
        "请根据以下面试问题和应答，从七个维度进行评分（1-5分）并给出分析理由：\n\n\
         1. 专业知识水平：对专业领域的理解深度和广度\n\
         2. 技能匹配度：技能与岗位要求的匹配程度\n\
         3. 语言表达能力：表达的清晰度、逻辑性和专业性\n\
         4. 逻辑思维能力：分析问题和解决问题的思路\n\
         5. 创新能力：思维的创新性和解决方案的独特性\n\
         6. 应变抗压能力：处理压力和突发情况的能力\n\
         7. 答案正确性：回答的准确性和完整性，针对问题涉及的知识点进行评估\n\n\
         评分标准：\n\
         1分：不及格，完全不符合要求\n\
         2分：基础水平，勉强达到基本要求\n\
         3分：中等水平，基本符合要求\n\
         4分：良好水平，超出基本要求\n\
         5分：优秀水平，远超预期要求\n\n\
         问题涉及的知识点：{points}\n\n\
         请按以下格式输出：\n\
         专业知识水平：X分。理由：...\n\
         技能匹配度：X分。理由：...\n\
         语言表达能力：X分。理由：...\n\
         逻辑思维能力：X分。理由：...\n\
         创新能力：X分。理由：...\n\
         应变抗压能力：X分。理由：...\n\
         答案正确性：X分。理由：...\n\n\
         面试问题：{question}\n\
         应答内容：{answer}"
    )
}

/// Parse `<维度>：X分。理由：...` lines. Dimensions that fail to parse keep
/// the neutral 3.0. Returns the scores and whether any line parsed.
pub fn parse_scores(response: &str) -> (RubricScores, bool) {
    let mut scores = RubricScores::neutral();
    let mut parsed_any = false;
    for line in response.lines() {
        let Some(score) = line_score(line) else {
            continue;
        };
        let target = if line.contains("专业知识") {
            &mut scores.professional_knowledge
        } else if line.contains("技能匹配") {
            &mut scores.skill_matching
        } else if line.contains("语言表达") {
            &mut scores.communication
        } else if line.contains("逻辑思维") {
            &mut scores.logical_thinking
        } else if line.contains("创新能力") {
            &mut scores.innovation
        } else if line.contains("应变抗压") {
            &mut scores.stress_handling
        } else if line.contains("正确性") {
            &mut scores.correctness
        } else {
            continue;
        };
        *target = score;
        parsed_any = true;
    }
    (scores.clamped(), parsed_any)
}

fn line_score(line: &str) -> Option<f64> {
    if !line.contains("分。") && !line.contains("分.") {
        return None;
    }
    let after_label = line.split(['：', ':']).nth(1)?;
    let score_text: String = after_label
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    score_text.parse().ok()
}

/// One scorer job: optional offline re-transcription, LLM rubric scoring,
/// then a single score write. Never fails the interview; every error path
/// leaves the answer with neutral scores and a recorded failure.
pub async fn score_answer<C: ChatModel>(
    db: &DbPool,
    chat: &C,
    offline: Option<&OfflineTranscriber>,
    answer_id: &str,
    clip_path: Option<&str>,
) -> Result<(), CoreError> {
    let Some(mut answer) = answers::get_answer(db, answer_id).await? else {
        tracing::warn!(answer_id, "scoring skipped: answer not found");
        return Err(CoreError::NotFound);
    };

    // A cleaner offline transcript replaces the live-caption text.
    if let (Some(transcriber), Some(path)) = (offline, clip_path) {
        match transcriber.transcribe(Path::new(path)).await {
            Ok(text) if !text.is_empty() => {
                answers::update_answer_text(db, answer_id, &text).await?;
                answer.answer = text;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(answer_id, error = %e, "offline re-transcription failed, keeping live text");
            }
        }
    }

    let prompt = scoring_prompt(&answer.question, &answer.answer, &answer.knowledge_points);
    let video_b64 = match clip_path {
        Some(path) if path.ends_with(".mp4") => match tokio::fs::read(path).await {
            Ok(bytes) => Some(BASE64.encode(bytes)),
            Err(e) => {
                tracing::debug!(answer_id, error = %e, "clip unreadable, scoring text only");
                None
            }
        },
        _ => None,
    };

    match chat.complete_with_video(&prompt, video_b64).await {
        Ok(response) => {
            let (scores, parsed_any) = parse_scores(&response);
            if !parsed_any {
                tracing::warn!(answer_id, "no dimension lines parsed, keeping neutral scores");
            }
            answers::update_scores(db, answer_id, &scores, &response).await?;
            Ok(())
        }
        Err(e) => {
            let note = format!("评分失败：{e}");
            answers::update_scores(db, answer_id, &RubricScores::neutral(), &note).await?;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_response_parses_all_dimensions() {
        let response = "专业知识水平：4分。理由：对索引原理理解扎实。\n\
                        技能匹配度：5分。理由：经验与岗位吻合。\n\
                        语言表达能力：3分。理由：表达基本清晰。\n\
                        逻辑思维能力：4分。理由：分析有条理。\n\
                        创新能力：2分。理由：方案较常规。\n\
                        应变抗压能力：3分。理由：未见明显压力测试。\n\
                        答案正确性：4.5分。理由：关键知识点覆盖完整。";
        let (scores, parsed) = parse_scores(response);
        assert!(parsed);
        assert_eq!(scores.professional_knowledge, 4.0);
        assert_eq!(scores.skill_matching, 5.0);
        assert_eq!(scores.innovation, 2.0);
        assert_eq!(scores.correctness, 4.5);
    }

    #[test]
    fn missing_dimensions_stay_neutral() {
        let response = "专业知识水平：5分。理由：很好。\n其他维度无法评估。";
        let (scores, parsed) = parse_scores(response);
        assert!(parsed);
        assert_eq!(scores.professional_knowledge, 5.0);
        assert_eq!(scores.communication, 3.0);
        assert_eq!(scores.stress_handling, 3.0);
    }

    #[test]
    fn unparseable_response_reports_nothing_parsed() {
        let (scores, parsed) = parse_scores("抱歉，我无法对此进行评分。");
        assert!(!parsed);
        assert_eq!(scores, RubricScores::neutral());
    }

    #[test]
    fn out_of_band_scores_are_clamped() {
        let (scores, parsed) = parse_scores("专业知识水平：9分。理由：超纲。");
        assert!(parsed);
        assert_eq!(scores.professional_knowledge, 5.0);
    }

    #[test]
    fn prompt_includes_knowledge_points_or_default() {
        let prompt = scoring_prompt("问题", "回答", &["MySQL索引".to_string()]);
        assert!(prompt.contains("MySQL索引"));
        let prompt = scoring_prompt("问题", "回答", &[]);
        assert!(prompt.contains("通用技能"));
    }

    #[test]
    fn malformed_score_lines_are_skipped() {
        assert_eq!(line_score("专业知识水平：很高分。理由：无"), None);
        assert_eq!(line_score("专业知识水平：4分。理由：好"), Some(4.0));
        assert_eq!(line_score("没有评分格式的行"), None);
    }

    struct CannedChat(&'static str);

    impl ChatModel for CannedChat {
        async fn complete(&self, _prompt: &str) -> Result<String, CoreError> {
            Ok(self.0.to_string())
        }

        async fn complete_with_video(
            &self,
            _prompt: &str,
            _video_b64: Option<String>,
        ) -> Result<String, CoreError> {
            Ok(self.0.to_string())
        }
    }

    struct DownChat;

    impl ChatModel for DownChat {
        async fn complete(&self, _prompt: &str) -> Result<String, CoreError> {
            Err(CoreError::Llm("connection refused".to_string()))
        }

        async fn complete_with_video(
            &self,
            _prompt: &str,
            _video_b64: Option<String>,
        ) -> Result<String, CoreError> {
            Err(CoreError::Llm("connection refused".to_string()))
        }
    }

    async fn seeded_answer() -> (DbPool, String) {
        let db = parley_db::create_pool("sqlite::memory:", 1)
            .await
            .expect("pool");
        parley_db::run_migrations(&db).await.expect("migrations");
        let interview = parley_db::interviews::create_interview(
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
        let answer_id = uuid::Uuid::new_v4().to_string();
        answers::create_answer(
            &db,
            &answer_id,
            interview.id,
            1,
            "请介绍索引优化。",
            "我会加联合索引。",
            &["MySQL索引".to_string()],
        )
        .await
        .expect("answer");
        (db, answer_id)
    }

    #[tokio::test]
    async fn scoring_persists_dimensions_and_rationale() {
        let (db, answer_id) = seeded_answer().await;
        let chat = CannedChat("专业知识水平：4分。理由：索引原理清楚。\n答案正确性：5分。理由：方案正确。");
        score_answer(&db, &chat, None, &answer_id, None)
            .await
            .expect("score");

        let row = answers::get_answer(&db, &answer_id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(row.scores.professional_knowledge, 4.0);
        assert_eq!(row.scores.correctness, 5.0);
        assert!(row.ai_analysis.as_deref().unwrap_or("").contains("索引原理清楚"));
    }

    #[tokio::test]
    async fn llm_failure_keeps_neutral_scores_and_records_it() {
        let (db, answer_id) = seeded_answer().await;
        let result = score_answer(&db, &DownChat, None, &answer_id, None).await;
        assert!(result.is_err());

        let row = answers::get_answer(&db, &answer_id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(row.scores, RubricScores::neutral());
        assert!(row.ai_analysis.as_deref().unwrap_or("").contains("评分失败"));
    }

    #[tokio::test]
    async fn scoring_a_missing_answer_is_not_found() {
        let db = parley_db::create_pool("sqlite::memory:", 1)
            .await
            .expect("pool");
        parley_db::run_migrations(&db).await.expect("migrations");
        let result = score_answer(&db, &DownChat, None, "no-such-answer", None).await;
        assert!(matches!(result, Err(CoreError::NotFound)));
    }
}
