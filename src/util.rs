//! Small shared utilities: shell-like argument splitting and C-string
//! escaping for protocol records.

/// Split a command line into arguments.
///
/// Recognizes single and double quotes, collapses runs of unquoted
/// whitespace, and stops at the first newline. An unterminated quote
/// consumes the rest of the line.
pub fn split_arguments(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    // distinguishes a quoted empty token from no token at all
    let mut has_token = false;
    let mut quote: Option<char> = None;

    for ch in line.chars() {
        if ch == '\n' {
            break;
        }
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                } else {
                    cur.push(ch);
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    has_token = true;
                }
                c if c.is_whitespace() => {
                    if has_token {
                        out.push(std::mem::take(&mut cur));
                        has_token = false;
                    }
                }
                c => {
                    cur.push(c);
                    has_token = true;
                }
            },
        }
    }
    if has_token {
        out.push(cur);
    }
    out
}

/// Escape a string for embedding in a C-string literal (`"..."`).
pub fn c_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::{c_escape, split_arguments};

    #[test]
    fn test_split_arguments() {
        struct TestCase {
            input: &'static str,
            expected: &'static [&'static str],
        }

        let cases = [
            TestCase {
                input: "",
                expected: &[],
            },
            TestCase {
                input: "run",
                expected: &["run"],
            },
            TestCase {
                input: "  a   b\tc  ",
                expected: &["a", "b", "c"],
            },
            TestCase {
                input: "exec 'a b' \"c d\"",
                expected: &["exec", "a b", "c d"],
            },
            TestCase {
                input: "say \"it's\"",
                expected: &["say", "it's"],
            },
            TestCase {
                input: "empty '' here",
                expected: &["empty", "", "here"],
            },
            TestCase {
                input: "pre\"fix mid\"post",
                expected: &["prefix midpost"],
            },
            TestCase {
                input: "first\nsecond",
                expected: &["first"],
            },
            TestCase {
                input: "open 'quote runs on",
                expected: &["open", "quote runs on"],
            },
        ];

        for tc in cases {
            assert_eq!(split_arguments(tc.input), tc.expected, "input: {:?}", tc.input);
        }
    }

    #[test]
    fn test_c_escape() {
        struct TestCase {
            input: &'static str,
            expected: &'static str,
        }

        let cases = [
            TestCase {
                input: "plain",
                expected: "plain",
            },
            TestCase {
                input: "say \"hi\"",
                expected: "say \\\"hi\\\"",
            },
            TestCase {
                input: "line\n",
                expected: "line\\n",
            },
            TestCase {
                input: "back\\slash",
                expected: "back\\\\slash",
            },
            TestCase {
                input: "tab\there",
                expected: "tab\\there",
            },
        ];

        for tc in cases {
            assert_eq!(c_escape(tc.input), tc.expected, "input: {:?}", tc.input);
        }
    }
}
