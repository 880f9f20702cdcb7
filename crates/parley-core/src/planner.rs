use crate::error::CoreError;
use crate::llm::ChatModel;
use parley_models::interview::{PlannedQuestion, PositionType, ResumeProfile};
use std::time::Duration;

/// Position details fed to the planners.
#[derive(Debug, Clone)]
pub struct PositionContext {
    pub position_type: PositionType,
    pub position_name: String,
    pub company_name: String,
    pub description: String,
}

/// Build the interview question queue. The LLM path runs under `deadline`;
/// on timeout or failure the deterministic per-position fallback is used so
/// session start is never blocked.
pub async fn plan_questions<C: ChatModel>(
    chat: &C,
    deadline: Duration,
    limit: usize,
    position: &PositionContext,
    resume: &ResumeProfile,
) -> Vec<PlannedQuestion> {
    match tokio::time::timeout(deadline, llm_plan(chat, limit, position, resume)).await {
        Ok(Ok(planned)) if !planned.is_empty() => planned,
        Ok(Ok(_)) | Ok(Err(_)) => {
            tracing::info!("question planner falling back to rule-based questions");
            fallback_plan(limit, position, resume)
        }
        Err(_elapsed) => {
            tracing::warn!(
                deadline_secs = deadline.as_secs(),
                "question planner deadline hit, using fallback"
            );
            fallback_plan(limit, position, resume)
        }
    }
}

async fn llm_plan<C: ChatModel>(
    chat: &C,
    limit: usize,
    position: &PositionContext,
    resume: &ResumeProfile,
) -> Result<Vec<PlannedQuestion>, CoreError> {
    let prompt = question_prompt(limit, position, resume);
    let response = chat.complete(&prompt).await?;
    let questions: Vec<String> = parse_listed_items(&response)
        .into_iter()
        .take(limit)
        .collect();
    if questions.is_empty() {
        return Err(CoreError::Llm("planner returned no questions".to_string()));
    }

    let tag_futures = questions.iter().map(|q| tag_question(chat, position, q));
    let tags = futures_util::future::join_all(tag_futures).await;

    Ok(questions
        .into_iter()
        .zip(tags)
        .map(|(question, knowledge_points)| PlannedQuestion {
            question,
            knowledge_points,
        })
        .collect())
}

/// Annotate one question with 3–6 knowledge points; failures substitute the
/// position-type default set.
async fn tag_question<C: ChatModel>(
    chat: &C,
    position: &PositionContext,
    question: &str,
) -> Vec<String> {
    let prompt = format!(
        "请列出下面这道面试问题主要考察的知识点（3到6个），每行一个，不要编号，不要解释。\n\n面试问题：{question}"
    );
    match chat.complete(&prompt).await {
        Ok(response) => {
            let points: Vec<String> = parse_listed_items(&response)
                .into_iter()
                .take(6)
                .collect();
            if points.is_empty() {
                default_knowledge_points(position.position_type)
            } else {
                points
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "knowledge point tagging failed, using defaults");
            default_knowledge_points(position.position_type)
        }
    }
}

fn question_prompt(limit: usize, position: &PositionContext, resume: &ResumeProfile) -> String {
    format!(
        "你是一位资深的面试官，需要根据候选人的简历和岗位要求，生成{limit}个有针对性的面试问题。\n\n\
         岗位信息：\n\
         - 岗位名称：{}\n\
         - 公司名称：{}\n\
         - 岗位类型：{}\n\
         - 岗位描述：{}\n\n\
         候选人简历信息：\n{}\n\n\
         问题应结合候选人的具体经历和技能，兼顾技术问题、项目问题与行为问题。\n\
         请直接返回{limit}个问题，每个问题一行，不要包含序号或其他说明。",
        position.position_name,
        position.company_name,
        position.position_type.as_str(),
        position.description,
        resume_summary(resume),
    )
}

fn resume_summary(resume: &ResumeProfile) -> String {
    let mut parts = Vec::new();
    if !resume.name.is_empty() {
        parts.push(format!("姓名：{}", resume.name));
    }
    if !resume.expected_position.is_empty() {
        parts.push(format!("期望职位：{}", resume.expected_position));
    }
    if !resume.skills.is_empty() {
        parts.push(format!("技能特长：{}", resume.skills));
    }
    if !resume.work_experiences.is_empty() {
        parts.push("工作经历：".to_string());
        for exp in &resume.work_experiences {
            parts.push(format!(
                "- {} {}：{}",
                exp.company_name, exp.position, exp.content
            ));
        }
    }
    if !resume.project_experiences.is_empty() {
        parts.push("项目经历：".to_string());
        for proj in &resume.project_experiences {
            parts.push(format!(
                "- {} 角色：{}：{}",
                proj.project_name, proj.role, proj.content
            ));
        }
    }
    if parts.is_empty() {
        parts.push("未提供".to_string());
    }
    parts.join("\n")
}

/// Split an LLM listing into clean items: ordinals, bullets, and blank
/// lines are stripped.
pub fn parse_listed_items(response: &str) -> Vec<String> {
    response
        .lines()
        .map(strip_list_marker)
        .filter(|line| line.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let mut rest = line.trim();
    rest = rest.trim_start_matches(['-', '*', '•', '·']).trim_start();
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let after = &rest[digits..];
        if let Some(stripped) = after
            .strip_prefix('.')
            .or_else(|| after.strip_prefix('、'))
            .or_else(|| after.strip_prefix('．'))
            .or_else(|| after.strip_prefix(')'))
            .or_else(|| after.strip_prefix('）'))
        {
            rest = stripped.trim_start();
        }
    }
    rest
}

/// Deterministic question plan: a fixed core per position type plus
/// skill- and project-triggered additions and two closing questions.
pub fn fallback_plan(
    limit: usize,
    position: &PositionContext,
    resume: &ResumeProfile,
) -> Vec<PlannedQuestion> {
    let mut questions = vec!["请简单介绍一下你的技术背景和主要技能。".to_string()];

    match position.position_type {
        PositionType::Backend => questions.extend([
            "你在后端开发中使用过哪些技术栈？请重点介绍你最熟悉的框架。".to_string(),
            "请描述一下你是如何设计和优化数据库的？".to_string(),
            "在处理高并发场景时，你有哪些经验和解决方案？".to_string(),
            "请介绍一下你对微服务架构的理解和实践。".to_string(),
        ]),
        PositionType::Frontend => questions.extend([
            "你熟悉哪些前端框架？请介绍你最擅长的技术栈。".to_string(),
            "你是如何进行前端性能优化的？有哪些具体的方法？".to_string(),
            "请介绍你在响应式设计方面的经验。".to_string(),
            "你如何处理前端的状态管理和数据流？".to_string(),
        ]),
        PositionType::Algo => questions.extend([
            "请介绍你最熟悉的机器学习算法和应用场景。".to_string(),
            "你在处理大规模数据时有哪些经验？".to_string(),
            "请描述一个你参与的算法优化项目。".to_string(),
            "你如何评估和选择合适的算法模型？".to_string(),
        ]),
        PositionType::Pm => questions.extend([
            "请介绍你的产品管理经验和方法论。".to_string(),
            "你是如何进行用户需求分析和产品规划的？".to_string(),
            "请描述一个你主导的产品项目从0到1的过程。".to_string(),
            "你如何平衡技术实现和用户需求？".to_string(),
        ]),
        _ => questions.extend([
            "请介绍你最近参与的一个技术项目。".to_string(),
            "你在团队协作中通常担任什么角色？".to_string(),
            "遇到技术难题时，你的解决思路是什么？".to_string(),
            "你如何保持技术学习和自我提升？".to_string(),
        ]),
    }

    let skills = resume.skills.to_lowercase();
    if skills.contains("java") || skills.contains("spring") {
        questions.push("请介绍你在Java/Spring开发中的经验和遇到的挑战。".to_string());
    }
    if skills.contains("python") || skills.contains("django") {
        questions.push("请分享你在Python开发中的实践经验。".to_string());
    }
    if skills.contains("react") || skills.contains("vue") || skills.contains("javascript") {
        questions.push("请介绍你在前端框架开发中的经验和最佳实践。".to_string());
    }

    if !resume.project_experiences.is_empty() {
        questions.push("请详细介绍你参与过的最有挑战性的项目。".to_string());
        let mentions = |keyword: &str| {
            resume
                .project_experiences
                .iter()
                .any(|p| p.project_name.contains(keyword) || p.content.contains(keyword))
        };
        if mentions("电商") || mentions("支付") {
            questions.push("在电商或支付项目中，你是如何保证系统的稳定性和安全性的？".to_string());
        }
    }

    questions.push("你对我们公司和这个岗位有什么了解？".to_string());
    questions.push("你对未来的职业规划是什么？".to_string());

    let points = default_knowledge_points(position.position_type);
    questions
        .into_iter()
        .take(limit)
        .map(|question| PlannedQuestion {
            question,
            knowledge_points: points.clone(),
        })
        .collect()
}

pub fn default_knowledge_points(position_type: PositionType) -> Vec<String> {
    let points: &[&str] = match position_type {
        PositionType::Backend => &["编程语言基础", "数据库", "高并发", "系统设计"],
        PositionType::Frontend => &["前端框架", "性能优化", "浏览器原理", "工程化"],
        PositionType::Algo => &["数据结构", "机器学习", "模型评估", "数学基础"],
        PositionType::Pm => &["需求分析", "产品规划", "项目管理", "沟通协调"],
        PositionType::Qa => &["测试用例设计", "自动化测试", "质量保障", "边界分析"],
        PositionType::Data => &["数据分析", "SQL", "统计学", "数据可视化"],
        PositionType::Other => &["综合素质", "沟通表达", "问题解决", "学习能力"],
    };
    points.iter().map(|p| p.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedChat {
        questions: String,
        tags: String,
    }

    impl ChatModel for CannedChat {
        async fn complete(&self, prompt: &str) -> Result<String, CoreError> {
            if prompt.contains("知识点") {
                Ok(self.tags.clone())
            } else {
                Ok(self.questions.clone())
            }
        }

        async fn complete_with_video(
            &self,
            prompt: &str,
            _video_b64: Option<String>,
        ) -> Result<String, CoreError> {
            self.complete(prompt).await
        }
    }

    struct StalledChat;

    impl ChatModel for StalledChat {
        async fn complete(&self, _prompt: &str) -> Result<String, CoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }

        async fn complete_with_video(
            &self,
            prompt: &str,
            _video_b64: Option<String>,
        ) -> Result<String, CoreError> {
            self.complete(prompt).await
        }
    }

    fn backend_position() -> PositionContext {
        PositionContext {
            position_type: PositionType::Backend,
            position_name: "后端开发工程师".to_string(),
            company_name: "示例科技".to_string(),
            description: "负责核心服务开发".to_string(),
        }
    }

    #[test]
    fn ordinals_and_bullets_are_stripped() {
        let response = "1. 请介绍你的项目。\n2、请谈谈数据库优化。\n- 你如何设计接口？\n\n3）高并发如何处理？";
        let items = parse_listed_items(response);
        assert_eq!(
            items,
            vec![
                "请介绍你的项目。",
                "请谈谈数据库优化。",
                "你如何设计接口？",
                "高并发如何处理？"
            ]
        );
    }

    #[tokio::test]
    async fn llm_path_attaches_knowledge_points() {
        let chat = CannedChat {
            questions: "1. 请介绍索引优化经验。\n2. 请介绍分布式事务。".to_string(),
            tags: "- MySQL索引\n- 查询优化\n- 存储引擎".to_string(),
        };
        let planned = plan_questions(
            &chat,
            Duration::from_secs(5),
            8,
            &backend_position(),
            &ResumeProfile::default(),
        )
        .await;
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].knowledge_points.len(), 3);
        assert_eq!(planned[0].knowledge_points[0], "MySQL索引");
    }

    #[tokio::test]
    async fn empty_llm_output_falls_back() {
        let chat = CannedChat {
            questions: "\n\n".to_string(),
            tags: String::new(),
        };
        let planned = plan_questions(
            &chat,
            Duration::from_secs(5),
            8,
            &backend_position(),
            &ResumeProfile::default(),
        )
        .await;
        // Empty résumé: opener + four backend questions + two closers.
        assert_eq!(planned.len(), 7);
        assert_eq!(planned[0].question, "请简单介绍一下你的技术背景和主要技能。");
        assert!(!planned[0].knowledge_points.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_forces_the_fallback() {
        let planned = plan_questions(
            &StalledChat,
            Duration::from_millis(50),
            8,
            &backend_position(),
            &ResumeProfile::default(),
        )
        .await;
        assert_eq!(planned.len(), 7);
    }

    #[test]
    fn skill_keywords_add_targeted_questions() {
        let resume = ResumeProfile {
            skills: "Java, Spring Boot, MySQL".to_string(),
            ..Default::default()
        };
        let planned = fallback_plan(12, &backend_position(), &resume);
        assert!(planned
            .iter()
            .any(|q| q.question.contains("Java/Spring")));
        // Closers are always present.
        assert!(planned
            .iter()
            .any(|q| q.question.contains("职业规划")));
    }

    #[test]
    fn payment_projects_trigger_the_stability_question() {
        use parley_models::interview::ProjectExperience;

        let resume = ResumeProfile {
            project_experiences: vec![ProjectExperience {
                project_name: "电商订单中台".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let planned = fallback_plan(12, &backend_position(), &resume);
        assert!(planned
            .iter()
            .any(|q| q.question.contains("最有挑战性的项目")));
        assert!(planned
            .iter()
            .any(|q| q.question.contains("稳定性和安全性")));

        // Projects without 电商/支付 content get the generic question only.
        let resume = ResumeProfile {
            project_experiences: vec![ProjectExperience {
                project_name: "校园论坛".to_string(),
                content: "帖子与回复功能".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let planned = fallback_plan(12, &backend_position(), &resume);
        assert!(!planned
            .iter()
            .any(|q| q.question.contains("稳定性和安全性")));
    }

    #[test]
    fn fallback_respects_the_limit() {
        let resume = ResumeProfile {
            skills: "java python react".to_string(),
            project_experiences: vec![Default::default()],
            ..Default::default()
        };
        let planned = fallback_plan(8, &backend_position(), &resume);
        assert_eq!(planned.len(), 8);
    }
}
