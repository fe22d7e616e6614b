//! 编码规范化
//!
//! 同一个产品编码会出现在缓存键、下游请求体和重复检测中，
//! 三处必须逐字节一致，所以统一经过 [`canonicalize`] 处理。

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// 单次折叠最多重复的轮数
///
/// 大小写转换和兼容分解偶尔会引出新的可折叠字符（ǿ → ø → O），
/// 实际两到三轮即收敛。
const MAX_PASSES: usize = 8;

/// 规范化产品编码
///
/// 单轮处理顺序：
/// 1. NFKC 兼容组合
/// 2. NFD 分解后去掉所有组合附加符号
/// 3. 形近字母和土耳其语字母折叠（Ø → O、ı → I 等）
/// 4. 与区域设置无关的大写转换，之后再去一次附加符号、再折叠一次
/// 5. 空白合并为一个空格并去掉首尾空白
///
/// 重复单轮处理直到结果不再变化，因此对任意输入都满足幂等性。空白输入返回空串。
pub fn canonicalize(raw: &str) -> String {
    let mut current = fold_pass(raw);
    for _ in 0..MAX_PASSES {
        let next = fold_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn fold_pass(input: &str) -> String {
    let composed: String = input.nfkc().collect();
    let folded = fold_letters(&strip_marks(&composed));
    let upper = fold_letters(&strip_marks(&folded.to_uppercase()));
    upper.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_marks(input: &str) -> String {
    input
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect()
}

fn fold_letters(input: &str) -> String {
    let mut folded = String::with_capacity(input.len());
    for c in input.chars() {
        match fold_char(c) {
            Folded::One(f) => folded.push(f),
            Folded::Two(a, b) => {
                folded.push(a);
                folded.push(b);
            }
        }
    }
    folded
}

enum Folded {
    One(char),
    Two(char, char),
}

fn fold_char(c: char) -> Folded {
    let f = match c {
        // 形近字母
        'Ø' | 'ø' => 'O',
        'Đ' | 'đ' => 'D',
        'Ł' | 'ł' => 'L',
        'Æ' | 'æ' => return Folded::Two('A', 'E'),
        'Œ' | 'œ' => return Folded::Two('O', 'E'),
        // 土耳其语字母
        'İ' | 'ı' | 'Î' | 'î' => 'I',
        'Ş' | 'ş' => 'S',
        'Ğ' | 'ğ' => 'G',
        'Ü' | 'ü' | 'Û' | 'û' => 'U',
        'Ö' | 'ö' => 'O',
        'Ç' | 'ç' => 'C',
        'Â' | 'â' => 'A',
        // 制表符、不换行空格等统一当作空格
        c if c.is_whitespace() => ' ',
        c => c,
    };
    Folded::One(f)
}

/// 规范化后的产品编码
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalCode(String);

impl CanonicalCode {
    /// 从原始编码创建（内部执行规范化）
    pub fn new(raw: &str) -> Self {
        Self(canonicalize(raw))
    }

    /// 生成带版本号的编码
    ///
    /// 第 1 版与基础编码相同；第 n 版（n ≥ 2）为 `基础编码 + 后缀 + n`，再做一次规范化
    pub fn versioned(&self, version: u32, suffix: &str) -> Self {
        if version <= 1 {
            return self.clone();
        }
        Self::new(&format!("{}{}{}", self.0, suffix, version))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CanonicalCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CanonicalCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
