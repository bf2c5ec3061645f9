//! 实验时间轴模块
//!
//! 把一份声明式的实验定义（放松时长、动作时长、循环次数）展开成
//! 有序的提示计划表。每次会话重新构建，构建后不再修改。

/// 放松提示文本
pub const RELAX_PROMPT: &str = "Relax";

/// 实验定义（外部协作方传入，数值已校验为非负）
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentDefinition {
    /// 动作提示文本（如 "Clench Fist"）
    pub prompt_text: String,

    /// 每段放松时长，秒
    pub relax_seconds: f64,

    /// 每段动作时长，秒
    pub action_seconds: f64,

    /// 放松/动作循环次数
    pub loop_count: u32,
}

/// 时间轴条目: 经过秒数 -> 该时刻应显示的提示
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub at: f64,
    pub prompt: String,
}

/// 提示计划表
///
/// 条目按构建顺序排列，键非递减。两个计算出的偏移重合时后写覆盖
/// （已知怪癖: 零长动作段会让一次提示变迁消失）。
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// 从实验定义构建时间轴
    ///
    /// 算法: 0 秒处记一条放松; 每次循环先累加放松时长记动作提示，
    /// 再累加动作时长记放松; 循环结束后再追加一段放松。
    /// 同一定义构建结果恒定。
    pub fn build(def: &ExperimentDefinition) -> Timeline {
        let mut timeline = Timeline {
            entries: Vec::with_capacity(2 * def.loop_count as usize + 2),
        };

        let mut t = 0.0;
        timeline.push(t, RELAX_PROMPT.to_string());

        for _ in 0..def.loop_count {
            t += def.relax_seconds;
            timeline.push(t, def.prompt_text.clone());

            t += def.action_seconds;
            timeline.push(t, RELAX_PROMPT.to_string());
        }

        t += def.relax_seconds;
        timeline.push(t, RELAX_PROMPT.to_string());

        timeline
    }

    // 键重合时覆盖前一条（后写获胜）
    fn push(&mut self, at: f64, prompt: String) {
        if let Some(last) = self.entries.last_mut() {
            if last.at == at {
                last.prompt = prompt;
                return;
            }
        }
        self.entries.push(TimelineEntry { at, prompt });
    }

    /// 名义时长: 最后一个键，即本次会话必须捕获满的设备时钟跨度
    pub fn nominal_duration(&self) -> f64 {
        self.entries.last().map(|e| e.at).unwrap_or(0.0)
    }

    /// 条目数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按构建顺序访问全部条目
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// 创建一个从头开始的查询游标
    pub fn cursor(&self) -> TimelineCursor<'_> {
        TimelineCursor {
            entries: &self.entries,
            next: 0,
        }
    }
}

/// 时间轴游标: 单调推进的"最近且不超过"查询
///
/// 时钟只用整数秒探测，而键可能是小数。游标返回自上次推进以来
/// 越过的最后一个条目，小数键因此会在其后的第一个整数秒生效，
/// 而不是被无声丢弃。
pub struct TimelineCursor<'a> {
    entries: &'a [TimelineEntry],
    next: usize,
}

impl<'a> TimelineCursor<'a> {
    /// 推进到 elapsed 秒
    ///
    /// # 返回
    /// * `Some(prompt)` - 本次推进越过了至少一个键，返回最后越过的提示
    /// * `None` - 没有新的提示变迁
    pub fn advance(&mut self, elapsed: f64) -> Option<&'a str> {
        let mut hit = None;

        while self.next < self.entries.len() && self.entries[self.next].at <= elapsed {
            hit = Some(self.entries[self.next].prompt.as_str());
            self.next += 1;
        }

        hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(relax: f64, action: f64, loops: u32) -> ExperimentDefinition {
        ExperimentDefinition {
            prompt_text: "Clench Fist".to_string(),
            relax_seconds: relax,
            action_seconds: action,
            loop_count: loops,
        }
    }

    #[test]
    fn test_build_reference_schedule() {
        // relax=2, action=3, loops=2 => 键序列 0,2,5,7,10,12
        let timeline = Timeline::build(&def(2.0, 3.0, 2));

        let keys: Vec<f64> = timeline.entries().iter().map(|e| e.at).collect();
        assert_eq!(keys, vec![0.0, 2.0, 5.0, 7.0, 10.0, 12.0]);

        let prompts: Vec<&str> = timeline
            .entries()
            .iter()
            .map(|e| e.prompt.as_str())
            .collect();
        assert_eq!(
            prompts,
            vec![
                "Relax",
                "Clench Fist",
                "Relax",
                "Clench Fist",
                "Relax",
                "Relax"
            ]
        );

        // 2L + 2 条
        assert_eq!(timeline.len(), 6);
        assert_eq!(timeline.nominal_duration(), 12.0);

        println!("参考计划表测试通过");
    }

    #[test]
    fn test_build_deterministic() {
        let d = def(2.0, 3.0, 4);
        assert_eq!(Timeline::build(&d), Timeline::build(&d));
    }

    #[test]
    fn test_keys_non_decreasing() {
        let timeline = Timeline::build(&def(1.5, 0.5, 5));
        let keys: Vec<f64> = timeline.entries().iter().map(|e| e.at).collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_zero_loops() {
        // 循环数为0: 只剩开头的放松和结尾的放松
        let timeline = Timeline::build(&def(5.0, 3.0, 0));
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.nominal_duration(), 5.0);

        // 放松时长也为0时两条重合为一条
        let collapsed = Timeline::build(&def(0.0, 3.0, 0));
        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed.nominal_duration(), 0.0);
    }

    #[test]
    fn test_zero_action_span_collision() {
        // 已知边界: 动作时长为0时动作提示与随后的放松键重合，
        // 后写覆盖，动作提示消失
        let timeline = Timeline::build(&def(2.0, 0.0, 1));

        let keys: Vec<f64> = timeline.entries().iter().map(|e| e.at).collect();
        assert_eq!(keys, vec![0.0, 2.0, 4.0]);
        assert_eq!(timeline.entries()[1].prompt, "Relax");

        println!("键重合覆盖测试通过");
    }

    #[test]
    fn test_cursor_integer_ticks() {
        let timeline = Timeline::build(&def(2.0, 3.0, 2));
        let mut cursor = timeline.cursor();

        // 第1秒越过键0
        assert_eq!(cursor.advance(1.0), Some("Relax"));
        // 第2秒命中动作提示
        assert_eq!(cursor.advance(2.0), Some("Clench Fist"));
        // 3、4秒无变迁
        assert_eq!(cursor.advance(3.0), None);
        assert_eq!(cursor.advance(4.0), None);
        assert_eq!(cursor.advance(5.0), Some("Relax"));
        assert_eq!(cursor.advance(6.0), None);
        assert_eq!(cursor.advance(7.0), Some("Clench Fist"));
    }

    #[test]
    fn test_cursor_fractional_keys() {
        // 小数键在其后的第一个整数秒生效，不丢失
        let timeline = Timeline::build(&def(1.5, 1.0, 1));

        let keys: Vec<f64> = timeline.entries().iter().map(|e| e.at).collect();
        assert_eq!(keys, vec![0.0, 1.5, 2.5, 4.0]);

        let mut cursor = timeline.cursor();
        assert_eq!(cursor.advance(1.0), Some("Relax"));
        // 键1.5在第2秒生效
        assert_eq!(cursor.advance(2.0), Some("Clench Fist"));
        // 键2.5在第3秒生效
        assert_eq!(cursor.advance(3.0), Some("Relax"));
        assert_eq!(cursor.advance(4.0), Some("Relax"));

        println!("小数键游标测试通过");
    }

    #[test]
    fn test_cursor_skips_to_latest() {
        // 一次推进越过多个键时只报告最后一个（与后写覆盖一致）
        let timeline = Timeline::build(&def(2.0, 3.0, 1));
        let mut cursor = timeline.cursor();

        assert_eq!(cursor.advance(7.0), Some("Relax"));
        assert_eq!(cursor.advance(8.0), None);
    }
}
