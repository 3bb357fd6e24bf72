//! Tiny interpreter for workload commands.
//!
//! Understands enough shell to drive scenarios: `echo`, `exit N`, `true`,
//! `false`, `cat <mounted file>` and `kubectl <verb> <resource>[.<group>]`.
//! Segments are separated by `&&`, `;` or newlines; the first failing segment
//! ends the run. Anything else is a successful no-op.

/// An API call the workload attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub verb: String,
    pub group: String,
    pub resource: String,
}

/// Outcome of running a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub exit_code: i32,
    pub output: String,
}

/// What the interpreter needs from its surroundings.
pub trait Environment {
    /// Contents of a file in the mounted payload.
    fn read_file(&self, path: &str) -> Option<Vec<u8>>;

    /// Whether the workload's identity may perform the call.
    fn authorize(&self, call: &ApiCall) -> Result<(), String>;
}

/// Extracts the script from `["/bin/sh", "-c", script]`, or joins the argv.
pub fn script_of(command: &[String]) -> String {
    match command {
        [shell, flag, script, ..] if shell.ends_with("sh") && flag == "-c" => script.clone(),
        argv => argv.join(" "),
    }
}

/// Runs a script against an environment.
pub fn run(script: &str, env: &dyn Environment) -> Execution {
    let mut output = String::new();

    for segment in segments(script) {
        let words: Vec<&str> = segment.split_whitespace().collect();
        match words.as_slice() {
            [] | ["true"] => {}
            ["false"] => return Execution { exit_code: 1, output },
            ["exit"] => return Execution { exit_code: 0, output },
            ["exit", code, ..] => {
                let exit_code = code.parse().unwrap_or(2);
                return Execution { exit_code, output };
            }
            ["echo", rest @ ..] => {
                output.push_str(&unquote(&rest.join(" ")));
                output.push('\n');
            }
            ["cat", path] => match env.read_file(path) {
                Some(contents) => {
                    output.push_str(&String::from_utf8_lossy(&contents));
                    if !output.ends_with('\n') {
                        output.push('\n');
                    }
                }
                None => {
                    output.push_str(&format!("cat: {path}: No such file or directory\n"));
                    return Execution { exit_code: 1, output };
                }
            },
            ["kubectl", verb, target, ..] => {
                let (resource, group) = match target.split_once('.') {
                    Some((resource, group)) => (resource, group),
                    None => (*target, ""),
                };
                let call = ApiCall {
                    verb: verb.to_string(),
                    group: group.to_string(),
                    resource: resource.to_string(),
                };
                match env.authorize(&call) {
                    Ok(()) => output.push_str(&format!("{verb} {target}: ok\n")),
                    Err(message) => {
                        output.push_str(&message);
                        output.push('\n');
                        return Execution { exit_code: 1, output };
                    }
                }
            }
            _ => {}
        }
    }

    Execution {
        exit_code: 0,
        output,
    }
}

fn segments(script: &str) -> impl Iterator<Item = &str> {
    script
        .split(['\n', ';'])
        .flat_map(|part| part.split("&&"))
        .map(str::trim)
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    struct Env;

    impl Environment for Env {
        fn read_file(&self, path: &str) -> Option<Vec<u8>> {
            (path == "/test/hello.txt").then(|| b"hello from payload".to_vec())
        }

        fn authorize(&self, call: &ApiCall) -> Result<(), String> {
            if call.verb == "get" {
                Ok(())
            } else {
                Err(format!("forbidden: {}", call.verb))
            }
        }
    }

    #[rstest]
    #[case("echo hi", 0)]
    #[case("echo hi && exit 3", 3)]
    #[case("exit 0", 0)]
    #[case("false", 1)]
    #[case("true; echo done", 0)]
    #[case("cat /test/hello.txt", 0)]
    #[case("cat /test/missing.txt", 1)]
    #[case("kubectl get jobs.batch", 0)]
    #[case("kubectl delete jobs.batch", 1)]
    #[case("pip install x && python run.py", 0)]
    fn test_exit_codes(#[case] script: &str, #[case] expected: i32) {
        assert_eq!(run(script, &Env).exit_code, expected);
    }

    #[test]
    fn test_output_stops_at_failure() {
        let exec = run("echo one && false && echo two", &Env);
        assert_eq!(exec.output, "one\n");
    }

    #[test]
    fn test_echo_unquotes() {
        assert_eq!(run("echo 'quoted text'", &Env).output, "quoted text\n");
    }

    #[test]
    fn test_forbidden_message_is_emitted() {
        let exec = run("kubectl create pods", &Env);
        assert_eq!(exec.exit_code, 1);
        assert!(exec.output.contains("forbidden: create"));
    }

    #[test]
    fn test_script_of() {
        let sh = vec!["/bin/sh".to_string(), "-c".to_string(), "echo hi".to_string()];
        assert_eq!(script_of(&sh), "echo hi");
        let argv = vec!["echo".to_string(), "hi".to_string()];
        assert_eq!(script_of(&argv), "echo hi");
    }
}
