//! File name to language mapping

use std::path::Path;

/// Detects the language of a file from its name
///
/// Well-known file names are checked before extensions, so `Dockerfile` and
/// `Makefile` are recognized without one. Returns `None` for unknown files.
pub fn detect_language(path: &Path) -> Option<&'static str> {
    let file_name = path.file_name()?.to_str()?;
    if let Some(language) = language_for_file_name(file_name) {
        return Some(language);
    }
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    language_for_extension(&extension)
}

fn language_for_file_name(file_name: &str) -> Option<&'static str> {
    let language = match file_name {
        "Dockerfile" | "Containerfile" => "Docker",
        "Makefile" | "makefile" | "GNUmakefile" => "Makefile",
        "CMakeLists.txt" => "CMake",
        "Cargo.lock" | "Pipfile" | "poetry.lock" => "TOML",
        "Gemfile" | "Rakefile" => "Ruby",
        "Jenkinsfile" => "Groovy",
        "BUILD" | "WORKSPACE" | "BUILD.bazel" => "Starlark",
        _ => return None,
    };
    Some(language)
}

fn language_for_extension(extension: &str) -> Option<&'static str> {
    let language = match extension {
        "rs" => "Rust",
        "py" | "pyi" | "pyw" => "Python",
        "js" | "mjs" | "cjs" => "JavaScript",
        "jsx" => "JSX",
        "ts" | "mts" | "cts" => "TypeScript",
        "tsx" => "TSX",
        "go" => "Go",
        "java" => "Java",
        "kt" | "kts" => "Kotlin",
        "scala" | "sc" => "Scala",
        "groovy" | "gradle" => "Groovy",
        "c" | "h" => "C",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => "C++",
        "cs" => "C#",
        "fs" | "fsx" => "F#",
        "m" => "Objective-C",
        "mm" => "Objective-C++",
        "swift" => "Swift",
        "rb" => "Ruby",
        "php" => "PHP",
        "pl" | "pm" => "Perl",
        "lua" => "Lua",
        "r" => "R",
        "jl" => "Julia",
        "dart" => "Dart",
        "ex" | "exs" => "Elixir",
        "erl" | "hrl" => "Erlang",
        "hs" => "Haskell",
        "ml" | "mli" => "OCaml",
        "clj" | "cljs" | "cljc" | "edn" => "Clojure",
        "zig" => "Zig",
        "nim" => "Nim",
        "v" | "sv" => "Verilog",
        "vhd" | "vhdl" => "VHDL",
        "sh" | "bash" | "zsh" => "Bash",
        "fish" => "Fish",
        "ps1" | "psm1" => "PowerShell",
        "bat" | "cmd" => "Batchfile",
        "sql" => "SQL",
        "html" | "htm" => "HTML",
        "css" => "CSS",
        "scss" => "SCSS",
        "sass" => "Sass",
        "less" => "Less",
        "vue" => "Vue",
        "svelte" => "Svelte",
        "json" => "JSON",
        "yaml" | "yml" => "YAML",
        "toml" => "TOML",
        "xml" | "xsd" | "xsl" => "XML",
        "ini" | "cfg" => "INI",
        "md" | "markdown" => "Markdown",
        "rst" => "reStructuredText",
        "tex" => "TeX",
        "proto" => "Protocol Buffer",
        "graphql" | "gql" => "GraphQL",
        "tf" | "hcl" => "HCL",
        "nix" => "Nix",
        "cmake" => "CMake",
        "mk" => "Makefile",
        "dockerfile" => "Docker",
        _ => return None,
    };
    Some(language)
}
