//! Graph construction and execution over real build trees.

use laze_lib::action::ActionError;
use laze_lib::build::{BuildError, Builder};
use laze_lib::platform::Platform;
use laze_lib::value::Value;

use super::common::{TestTree, string};

const SIZES: &str = r#"
sizes = rule{
  impl = function(ctx)
    local total = 0
    for _, src in ipairs(ctx.attrs.srcs) do
      total = total + src.value.size
    end
    return total
  end,
  attrs = {
    srcs = attr.label_list{ allow_files = { ".txt" } },
  },
}

sizes{ name = "total", srcs = { "a.txt", "b.txt" } }
"#;

mod construction {
  use super::*;

  #[tokio::test]
  async fn file_dependencies_reach_the_rule() {
    let tree = TestTree::new(&[("BUILD.lua", SIZES), ("a.txt", "aaa"), ("b.txt", "bb")]);

    let outcome = tree.build("total").await.unwrap();
    assert_eq!(outcome.label, "file://total");
    assert_eq!(outcome.result, Ok(Value::Int(5)));
    assert_eq!(outcome.stats.total, 3);
    assert_eq!(outcome.stats.executed, 3);
  }

  #[tokio::test]
  async fn labels_resolve_relative_to_their_build_file() {
    let tree = TestTree::new(&[
      (
        "app/BUILD.lua",
        r#"
          link = rule{
            impl = function(ctx) return ctx.attrs.lib.label .. " <- " .. ctx.attrs.lib.value end,
            attrs = { lib = attr.label{ mandatory = true } },
          }
          link{ name = "bin", lib = "../lib/core" }
        "#,
      ),
      (
        "lib/BUILD.lua",
        r#"
          lib = rule{ impl = function(ctx) return ctx.build_dir .. "/" .. ctx.name end }
          lib{ name = "core" }
        "#,
      ),
    ]);

    assert_eq!(tree.value("app/bin").await, string("file://lib/core <- lib/core"));
  }

  #[tokio::test]
  async fn shared_dependency_runs_once() {
    let tree = TestTree::new(&[(
      "BUILD.lua",
      r#"
        leaf = rule{
          impl = function(ctx)
            _G.leaf_runs = (_G.leaf_runs or 0) + 1
            return _G.leaf_runs
          end,
        }
        pair = rule{
          impl = function(ctx) return ctx.attrs.left.value + ctx.attrs.right.value end,
          attrs = { left = attr.label{}, right = attr.label{} },
        }
        leaf{ name = "leaf" }
        pair{ name = "both", left = "leaf", right = "./leaf" }
      "#,
    )]);

    let mut builder = tree.builder();
    let outcome = builder.build("both").await.unwrap();
    assert_eq!(outcome.result, Ok(Value::Int(2)));
    assert_eq!(builder.graph().len(), 2);
  }

  #[tokio::test]
  async fn missing_build_directory_is_reported() {
    let tree = TestTree::new(&[]);
    let err = tree.build("nowhere/bin").await.unwrap_err();
    assert!(matches!(err, BuildError::MissingDirectory { ref dir, .. } if dir == "nowhere"), "{}", err);
  }

  #[tokio::test]
  async fn unknown_label_is_not_found() {
    let tree = TestTree::new(&[("BUILD.lua", SIZES)]);
    let err = tree.build("missing").await.unwrap_err();
    assert!(matches!(err, BuildError::LabelNotFound(ref l) if l == "file://missing"), "{}", err);
  }

  #[tokio::test]
  async fn disallowed_extension_is_rejected() {
    let build = SIZES.replace("\"b.txt\"", "\"b.md\"");
    let tree = TestTree::new(&[("BUILD.lua", build.as_str()), ("a.txt", "a"), ("b.md", "b")]);

    let err = tree.build("total").await.unwrap_err();
    assert!(matches!(err, BuildError::FileTypeNotAllowed { .. }), "{}", err);
  }

  #[tokio::test]
  async fn cycles_across_build_files_are_reported() {
    let tree = TestTree::new(&[
      (
        "rules.lua",
        r#"
          return rule{
            impl = function(ctx) return nil end,
            attrs = { dep = attr.label{} },
          }
        "#,
      ),
      ("a/BUILD.lua", "local node = require('rules')\nnode{ name = 'x', dep = '../b/y' }"),
      ("b/BUILD.lua", "local node = require('rules')\nnode{ name = 'y', dep = '../a/x' }"),
    ]);

    let err = tree.build("a/x").await.unwrap_err();
    assert_eq!(err.to_string(), "dependency cycle: file://a/x -> file://b/y -> file://a/x");
  }

  #[tokio::test]
  async fn build_file_errors_name_the_file() {
    let tree = TestTree::new(&[("pkg/BUILD.lua", "error('bad build file')")]);
    let err = tree.build("pkg/anything").await.unwrap_err();
    assert!(matches!(err, BuildError::Eval { ref file, .. } if file == "pkg/BUILD.lua"), "{}", err);
  }
}

mod overrides {
  use super::*;

  const MODES: &str = r#"
    compile = rule{
      impl = function(ctx) return ctx.attrs.mode end,
      attrs = {
        mode = attr.string{ default = "debug", values = { "debug", "release" } },
        opt = attr.int{ default = 0 },
      },
    }
    compile{ name = "app" }
  "#;

  #[tokio::test]
  async fn query_parameter_overrides_string_attribute() {
    let tree = TestTree::new(&[("BUILD.lua", MODES)]);
    assert_eq!(tree.value("app").await, string("debug"));
    assert_eq!(tree.value("app?mode=release").await, string("release"));
  }

  #[tokio::test]
  async fn overridden_labels_are_distinct_nodes() {
    let tree = TestTree::new(&[("BUILD.lua", MODES)]);
    let mut builder = tree.builder();
    let plain = builder.create_action("app").unwrap();
    let release = builder.create_action("app?mode=release").unwrap();
    assert_ne!(plain, release);
    assert_eq!(builder.create_action("file://app?mode=release").unwrap(), release);
  }

  #[tokio::test]
  async fn override_must_respect_allowed_values() {
    let tree = TestTree::new(&[("BUILD.lua", MODES)]);
    let err = tree.build("app?mode=fast").await.unwrap_err();
    assert!(matches!(err, BuildError::Attr(_)), "{}", err);
  }

  #[tokio::test]
  async fn override_of_non_string_attribute_is_rejected() {
    let tree = TestTree::new(&[("BUILD.lua", MODES)]);
    let err = tree.build("app?opt=2").await.unwrap_err();
    assert!(matches!(err, BuildError::UnsupportedOverride { .. }), "{}", err);
  }

  #[tokio::test]
  async fn unknown_query_parameter_is_rejected() {
    let tree = TestTree::new(&[("BUILD.lua", MODES)]);
    let err = tree.build("app?flavor=x").await.unwrap_err();
    assert!(matches!(err, BuildError::UnknownQueryParam { .. }), "{}", err);
  }
}

mod execution {
  use super::*;

  const FAILING: &str = r#"
    broken = rule{
      impl = function(ctx) error("cannot compile " .. ctx.name, 0) end,
    }
    wrap = rule{
      impl = function(ctx) return "wrapped" end,
      attrs = { dep = attr.label{} },
    }
    broken{ name = "lib" }
    wrap{ name = "app", dep = "lib" }
  "#;

  #[tokio::test]
  async fn failure_propagates_to_dependents() {
    let tree = TestTree::new(&[("BUILD.lua", FAILING)]);

    let outcome = tree.build("app").await.unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.error(), Some(&ActionError::Failed("cannot compile lib".into())));
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.skipped, 1);
  }

  #[tokio::test]
  async fn rule_context_describes_the_instance() {
    let tree = TestTree::new(&[(
      "tools/BUILD.lua",
      r#"
        info = rule{
          impl = function(ctx)
            return {
              key = ctx.key,
              label = ctx.label,
              name = ctx.name,
              build_dir = ctx.build_dir,
              build_file_path = ctx.build_file_path,
              os = ctx.os,
              arch = ctx.arch,
            }
          end,
        }
        info{ name = "inspect" }
      "#,
    )]);

    let Value::Map(map) = tree.value("tools/inspect").await else {
      panic!("expected a map");
    };
    assert_eq!(map["key"], string("tools/inspect"));
    assert_eq!(map["label"], string("file://tools/inspect"));
    assert_eq!(map["name"], string("inspect"));
    assert_eq!(map["build_dir"], string("tools"));
    assert_eq!(map["build_file_path"], string("tools/BUILD.lua"));
    let platform = Platform::current();
    assert_eq!(map["os"], string(platform.os.as_str()));
    assert_eq!(map["arch"], string(platform.arch.as_str()));
  }

  #[tokio::test]
  async fn trailing_args_reach_rules() {
    let tree = TestTree::new(&[(
      "BUILD.lua",
      "args = rule{ impl = function(ctx) return ctx.args end }\nargs{ name = 'a' }",
    )]);

    let mut config = tree.config();
    config.args = vec!["--release".into(), "x".into()];
    let mut builder = Builder::new(config).unwrap();
    let outcome = builder.build("a").await.unwrap();
    assert_eq!(outcome.result, Ok(Value::List(vec![string("--release"), string("x")])));
  }

  #[tokio::test]
  async fn write_and_stat_outputs() {
    let tree = TestTree::new(&[(
      "gen/BUILD.lua",
      r#"
        gen = rule{
          impl = function(ctx)
            local out = ctx.actions:declare("out", ctx.build_dir, ctx.name .. ".txt")
            ctx.actions:write{ name = out, content = ctx.attrs.text }
            return ctx.actions:stat(out)
          end,
          attrs = { text = attr.string{ mandatory = true } },
        }
        gen{ name = "greeting", text = "hello laze\n" }
      "#,
    )]);

    let value = tree.value("gen/greeting").await;
    let info = value.as_file().expect("file info");
    assert_eq!(info.basename, "greeting.txt");
    assert_eq!(info.size, 11);
    let written = std::fs::read_to_string(tree.root().join("out/gen/greeting.txt")).unwrap();
    assert_eq!(written, "hello laze\n");
  }

  #[tokio::test]
  async fn tar_packages_dependencies() {
    let tree = TestTree::new(&[
      (
        "BUILD.lua",
        r#"
          pkg = rule{
            impl = function(ctx)
              local files = {}
              for _, src in ipairs(ctx.attrs.srcs) do
                table.insert(files, src.value.path)
              end
              return ctx.actions:tar{
                name = ctx.actions:declare("dist", ctx.name .. ".tar.gz"),
                files = files,
                mode = 493,
              }
            end,
            attrs = { srcs = attr.label_list{ allow_files = true } },
          }
          pkg{ name = "bundle", srcs = { "bin/tool", "README" } }
        "#,
      ),
      ("bin/tool", "#!/bin/sh\n"),
      ("README", "docs"),
    ]);

    let value = tree.value("bundle").await;
    let info = value.as_file().expect("file info");
    assert_eq!(info.basename, "bundle.tar.gz");
    assert!(info.size > 0);

    let bytes = std::fs::read(tree.root().join("dist/bundle.tar.gz")).unwrap();
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn run_executes_in_rule_directory() {
    let tree = TestTree::new(&[
      (
        "svc/BUILD.lua",
        r#"
          sh = rule{
            impl = function(ctx)
              return ctx.actions:run{
                name = "sh",
                args = { "-c", "cat marker; printf \"$GREETING\"" },
                env = { "GREETING=hi" },
              }
            end,
          }
          sh{ name = "cmd" }
        "#,
      ),
      ("svc/marker", "here:"),
    ]);

    assert_eq!(tree.value("svc/cmd").await, string("here:hi"));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn failed_command_reports_exit_code() {
    let tree = TestTree::new(&[(
      "BUILD.lua",
      r#"
        sh = rule{
          impl = function(ctx)
            return ctx.actions:run{ name = "sh", args = { "-c", "echo nope; exit 3" } }
          end,
        }
        sh{ name = "fail" }
      "#,
    )]);

    let outcome = tree.build("fail").await.unwrap();
    let Some(ActionError::Command { code, output, .. }) = outcome.error() else {
      panic!("expected command error, got {:?}", outcome.result);
    };
    assert_eq!(*code, Some(3));
    assert!(output.contains("nope"));
  }

  #[tokio::test]
  async fn self_referencing_result_fails_only_its_node() {
    let tree = TestTree::new(&[(
      "BUILD.lua",
      r#"
        loop = rule{ impl = function(ctx) local t = { x = 1 } t.self = t return t end }
        ok = rule{ impl = function(ctx) return "fine" end }
        top = rule{
          impl = function(ctx) return "unreachable" end,
          attrs = { deps = attr.label_list{} },
        }
        loop{ name = "loop" }
        ok{ name = "ok" }
        top{ name = "top", deps = { "loop", "ok" } }
      "#,
    )]);

    let outcome = tree.build("top").await.unwrap();
    let Some(ActionError::Failed(message)) = outcome.error() else {
      panic!("expected a failed action, got {:?}", outcome.result);
    };
    assert!(message.contains("contains itself"), "{}", message);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.skipped, 1);
    assert_eq!(outcome.stats.executed, 2);
  }

  #[tokio::test]
  async fn cancelled_build_skips_work() {
    let tree = TestTree::new(&[("BUILD.lua", SIZES), ("a.txt", "a"), ("b.txt", "b")]);

    let config = tree.config();
    config.execute.cancel.cancel();
    let mut builder = Builder::new(config).unwrap();
    let outcome = builder.build("total").await.unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.stats.executed, 0);
  }
}

#[cfg(unix)]
mod concurrency {
  use std::time::{Duration, Instant};

  use super::*;

  const SLEEPERS: &str = r#"
    sleeper = rule{
      impl = function(ctx)
        ctx.actions:run{ name = "sleep", args = { "1" } }
        return ctx.name
      end,
    }
    collect = rule{
      impl = function(ctx)
        local names = {}
        for _, dep in ipairs(ctx.attrs.deps) do
          table.insert(names, dep.value)
        end
        return names
      end,
      attrs = { deps = attr.label_list{} },
    }
    sleeper{ name = "a" }
    sleeper{ name = "b" }
    sleeper{ name = "c" }
    sleeper{ name = "d" }
    collect{ name = "all", deps = { "a", "b", "c", "d" } }
  "#;

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn lua_rule_actions_overlap() {
    let tree = TestTree::new(&[("BUILD.lua", SLEEPERS)]);

    let mut config = tree.config();
    config.execute.parallelism = 4;
    let mut builder = Builder::new(config).unwrap();

    let started = Instant::now();
    let outcome = builder.build("all").await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(
      outcome.result,
      Ok(Value::List(vec![string("a"), string("b"), string("c"), string("d")]))
    );
    // Four one-second commands; serial execution would take four seconds.
    assert!(elapsed < Duration::from_millis(2500), "took {:?}", elapsed);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn single_worker_runs_actions_in_turn() {
    let tree = TestTree::new(&[
      (
        "BUILD.lua",
        r#"
          sleeper = rule{
            impl = function(ctx) ctx.actions:run{ name = "sleep", args = { "0.3" } } end,
          }
          pair = rule{ impl = function(ctx) return true end, attrs = { deps = attr.label_list{} } }
          sleeper{ name = "a" }
          sleeper{ name = "b" }
          pair{ name = "both", deps = { "a", "b" } }
        "#,
      ),
    ]);

    let mut config = tree.config();
    config.execute.parallelism = 1;
    let mut builder = Builder::new(config).unwrap();

    let started = Instant::now();
    let outcome = builder.build("both").await.unwrap();
    assert_eq!(outcome.result, Ok(Value::Bool(true)));
    assert!(started.elapsed() >= Duration::from_millis(600));
  }
}
