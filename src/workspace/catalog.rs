//! Built-in coding questions and their starter code

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Language the shared code buffer is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    Python,
    Java,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::JavaScript, Language::Python, Language::Java];

    pub fn id(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Java => "java",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|l| l.id().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown language '{}'", s))
    }
}

/// Worked example shown with a question
#[derive(Debug, Clone, Copy)]
pub struct Example {
    pub input: &'static str,
    pub output: &'static str,
    pub explanation: Option<&'static str>,
}

/// A coding question with starter code for every [`Language`]
#[derive(Debug, Clone, Copy)]
pub struct Question {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub examples: &'static [Example],
    pub constraints: &'static [&'static str],
    javascript: &'static str,
    python: &'static str,
    java: &'static str,
}

impl Question {
    /// Canonical starter text for `language`
    pub fn starter_code(&self, language: Language) -> &'static str {
        match language {
            Language::JavaScript => self.javascript,
            Language::Python => self.python,
            Language::Java => self.java,
        }
    }
}

static QUESTIONS: [Question; 3] = [
    Question {
        id: "two-sum",
        title: "Two Sum",
        description: "Given an array of integers `nums` and an integer `target`, return indices of the two numbers such that they add up to `target`.\n\nYou may assume that each input would have exactly one solution, and you may not use the same element twice.",
        examples: &[
            Example {
                input: "nums = [2,7,11,15], target = 9",
                output: "[0,1]",
                explanation: Some("Because nums[0] + nums[1] == 9, we return [0, 1]"),
            },
            Example {
                input: "nums = [3,2,4], target = 6",
                output: "[1,2]",
                explanation: None,
            },
        ],
        constraints: &[
            "2 ≤ nums.length ≤ 10⁴",
            "-10⁹ ≤ nums[i] ≤ 10⁹",
            "Only one valid answer exists",
        ],
        javascript: "function twoSum(nums, target) {\n  // Write your solution here\n\n}\n",
        python: "def two_sum(nums, target):\n    # Write your solution here\n    pass\n",
        java: "class Solution {\n    public int[] twoSum(int[] nums, int target) {\n        // Write your solution here\n\n    }\n}\n",
    },
    Question {
        id: "reverse-string",
        title: "Reverse String",
        description: "Write a function that reverses a string. The input string is given as an array of characters `s`.\n\nYou must do this by modifying the input array in-place with O(1) extra memory.",
        examples: &[Example {
            input: "s = [\"h\",\"e\",\"l\",\"l\",\"o\"]",
            output: "[\"o\",\"l\",\"l\",\"e\",\"h\"]",
            explanation: None,
        }],
        constraints: &["1 ≤ s.length ≤ 10⁵", "s[i] is a printable ascii character"],
        javascript: "function reverseString(s) {\n  // Write your solution here\n\n}\n",
        python: "def reverse_string(s):\n    # Write your solution here\n    pass\n",
        java: "class Solution {\n    public void reverseString(char[] s) {\n        // Write your solution here\n\n    }\n}\n",
    },
    Question {
        id: "palindrome-number",
        title: "Palindrome Number",
        description: "Given an integer `x`, return `true` if `x` is a palindrome, and `false` otherwise.\n\nAn integer is a palindrome when it reads the same forward and backward.",
        examples: &[
            Example {
                input: "x = 121",
                output: "true",
                explanation: Some("121 reads as 121 from left to right and from right to left."),
            },
            Example {
                input: "x = -121",
                output: "false",
                explanation: Some("From left to right, it reads -121. From right to left, it becomes 121-."),
            },
        ],
        constraints: &["-2³¹ ≤ x ≤ 2³¹ - 1"],
        javascript: "function isPalindrome(x) {\n  // Write your solution here\n\n}\n",
        python: "def is_palindrome(x):\n    # Write your solution here\n    pass\n",
        java: "class Solution {\n    public boolean isPalindrome(int x) {\n        // Write your solution here\n\n    }\n}\n",
    },
];

/// All questions, in presentation order
pub fn questions() -> &'static [Question] {
    &QUESTIONS
}

/// Question shown when a workspace is created
pub fn default_question() -> &'static Question {
    &QUESTIONS[0]
}

pub fn find_question(id: &str) -> Option<&'static Question> {
    QUESTIONS.iter().find(|q| q.id == id)
}
