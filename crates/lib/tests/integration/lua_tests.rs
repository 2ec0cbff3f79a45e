//! The build language as seen from `BUILD.lua` files.

use laze_lib::build::BuildError;
use laze_lib::eval::EvalError;
use laze_lib::rule::RuleError;
use laze_lib::value::Value;

use super::common::{TestTree, string};

/// Unwrap the evaluation error of a failed build.
fn eval_error(err: BuildError) -> EvalError {
  match err {
    BuildError::Eval { source, .. } => source,
    other => panic!("expected an evaluation error, got {}", other),
  }
}

mod modules {
  use super::*;

  #[tokio::test]
  async fn rules_can_live_in_modules() {
    let tree = TestTree::new(&[
      (
        "rules/go/init.lua",
        r#"
          local M = {}
          M.here = __dir
          M.binary = rule{
            impl = function(ctx) return "go build " .. ctx.attrs.pkg end,
            attrs = { pkg = attr.string{ mandatory = true } },
          }
          return M
        "#,
      ),
      (
        "cmd/BUILD.lua",
        r#"
          local go = require("rules.go")
          go.binary{ name = "server", pkg = "./server" }
        "#,
      ),
    ]);

    assert_eq!(tree.value("cmd/server").await, string("go build ./server"));
  }

  #[tokio::test]
  async fn module_dir_is_the_module_directory() {
    let tree = TestTree::new(&[
      ("lib/paths.lua", "return { dir = __dir }"),
      (
        "BUILD.lua",
        r#"
          local paths = require("lib.paths")
          where = rule{ impl = function(ctx) return { module = paths.dir, build = __dir } end }
          where{ name = "dirs" }
        "#,
      ),
    ]);

    let Value::Map(map) = tree.value("dirs").await else {
      panic!("expected a map");
    };
    let root = tree.root().canonicalize().unwrap();
    assert_eq!(map["module"], string(&root.join("lib").to_string_lossy()));
    assert_eq!(map["build"], string(&root.to_string_lossy()));
  }

  #[tokio::test]
  async fn missing_module_fails_evaluation() {
    let tree = TestTree::new(&[("BUILD.lua", "require('no.such.module')")]);
    let err = eval_error(tree.build("x").await.unwrap_err());
    assert!(matches!(err, EvalError::Script(ref msg) if msg.contains("no.such.module")), "{}", err);
  }
}

mod build_files {
  use super::*;

  #[tokio::test]
  async fn top_level_names_stay_in_their_file() {
    let tree = TestTree::new(&[
      (
        "a/BUILD.lua",
        r#"
          secret = "a"
          peek = rule{ impl = function(ctx) return secret end }
          peek{ name = "p" }
        "#,
      ),
      (
        "b/BUILD.lua",
        r#"
          peek = rule{
            impl = function(ctx) return { secret = secret == nil, dep = ctx.attrs.dep.value } end,
            attrs = { dep = attr.label{} },
          }
          peek{ name = "p", dep = "../a/p" }
        "#,
      ),
    ]);

    let Value::Map(map) = tree.value("b/p").await else {
      panic!("expected a map");
    };
    assert_eq!(map["secret"], Value::Bool(true));
    assert_eq!(map["dep"], string("a"));
  }

  #[tokio::test]
  async fn laze_global_describes_the_build() {
    let tree = TestTree::new(&[(
      "BUILD.lua",
      r#"
        host = rule{ impl = function(ctx) return { laze.os == ctx.os, laze.arch == ctx.arch, laze.root } end }
        host{ name = "h" }
      "#,
    )]);

    let Value::List(items) = tree.value("h").await else {
      panic!("expected a list");
    };
    assert_eq!(items[0], Value::Bool(true));
    assert_eq!(items[1], Value::Bool(true));
    let Value::String(root) = &items[2] else {
      panic!("expected root path");
    };
    assert!(std::path::Path::new(root).is_absolute());
  }

  #[tokio::test]
  async fn rules_and_attrs_print_usefully() {
    let tree = TestTree::new(&[(
      "BUILD.lua",
      r#"
        local r = rule{
          impl = function(ctx) end,
          attrs = { srcs = attr.label_list{}, out = attr.string{} },
        }
        shown = rule{ impl = function(ctx) return { tostring(r), attr.string{}.type } end }
        shown{ name = "s" }
      "#,
    )]);

    let Value::List(items) = tree.value("s").await else {
      panic!("expected a list");
    };
    assert_eq!(items[0], string("rule(name, out, srcs)"));
    assert_eq!(items[1], string("string"));
  }
}

mod instantiation_errors {
  use super::*;

  const GREET: &str = r#"
    greet = rule{
      impl = function(ctx) return ctx.attrs.who end,
      attrs = { who = attr.string{ mandatory = true } },
    }
  "#;

  async fn error_for(body: &str) -> EvalError {
    let build = format!("{}\n{}", GREET, body);
    let tree = TestTree::new(&[("BUILD.lua", build.as_str())]);
    eval_error(tree.build("x").await.unwrap_err())
  }

  #[tokio::test]
  async fn missing_mandatory_attribute() {
    let err = error_for("greet{ name = 'x' }").await;
    assert_eq!(err, EvalError::Rule(RuleError::MissingMandatory("who".into())));
  }

  #[tokio::test]
  async fn unexpected_attribute() {
    let err = error_for("greet{ name = 'x', who = 'a', extra = 1 }").await;
    assert_eq!(err, EvalError::Rule(RuleError::UnexpectedAttribute("extra".into())));
  }

  #[tokio::test]
  async fn positional_arguments() {
    let err = error_for("greet('x', 'y')").await;
    assert_eq!(err, EvalError::Rule(RuleError::PositionalArguments(2)));
  }

  #[tokio::test]
  async fn duplicate_names() {
    let err = error_for("greet{ name = 'x', who = 'a' }\ngreet{ name = 'x', who = 'b' }").await;
    assert!(matches!(err, EvalError::Rule(RuleError::Duplicate(_))), "{}", err);
  }

  #[tokio::test]
  async fn wrong_attribute_type() {
    let err = error_for("greet{ name = 'x', who = { 'a' } }").await;
    assert!(matches!(err, EvalError::Attr(_)), "{}", err);
  }
}
