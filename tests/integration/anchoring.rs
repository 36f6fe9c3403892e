use anchor_cli::core::AnchorError;
use anchor_cli::dockerfile;
use anchor_cli::rewrite::{Anchored, Anchorer, PinFormat};
use anchor_cli::test_utils::{StubDigestResolver, StubVersionResolver, init_test_logging};
use tokio_util::sync::CancellationToken;

const TEMPLATE: &str = r#"# syntax=docker/dockerfile:1
ARG GO_VERSION=1.22

FROM golang:1.22-bookworm AS builder
# anchor ignore=git
RUN apt-get update \
    && apt-get install --no-install-recommends -y \
        # build tools
        git make \
    && rm -rf /var/lib/apt/lists/*

WORKDIR /src
COPY . .
RUN make build

FROM debian:bookworm-slim
RUN apt-get update && apt-get install -y ca-certificates curl
COPY --from=builder /src/bin/app /usr/local/bin/app
ENTRYPOINT ["app"]
"#;

fn anchorer() -> Anchorer<StubDigestResolver, StubVersionResolver> {
    Anchorer::new(
        StubDigestResolver::new(&[
            ("golang:1.22-bookworm", "sha256:aaa"),
            ("debian:bookworm-slim", "sha256:bbb"),
        ]),
        StubVersionResolver::new(&[
            ("git", "1:2.39.2-1.1"),
            ("make", "4.3-4.1"),
            ("ca-certificates", "20230311"),
            ("curl", "7.88.1-10+deb12u5"),
        ]),
    )
}

#[tokio::test]
async fn test_multi_stage_template() {
    init_test_logging(None);
    let anchorer = anchorer();
    let mut nodes = dockerfile::parse(TEMPLATE);

    let report = anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap();

    let expected = r#"# syntax=docker/dockerfile:1
ARG GO_VERSION=1.22

FROM golang:1.22-bookworm@sha256:aaa AS builder
# anchor ignore=git
RUN dpkg --add-architecture amd64 && apt-get update && apt-get update \
    && apt-get install --no-install-recommends -y \
        # build tools
        git make=4.3-4.1 \
    && rm -rf /var/lib/apt/lists/*

WORKDIR /src
COPY . .
RUN make build

FROM debian:bookworm-slim@sha256:bbb
RUN dpkg --add-architecture amd64 && apt-get update && apt-get update && apt-get install -y ca-certificates=20230311 curl=7.88.1-10+deb12u5
COPY --from=builder /src/bin/app /usr/local/bin/app
ENTRYPOINT ["app"]
"#;
    assert_eq!(nodes.to_string(), expected);

    let calls = anchorer.version_resolver().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].packages, vec!["make"]);
    assert_eq!(calls[0].image, "golang:1.22-bookworm");
    assert_eq!(calls[1].packages, vec!["ca-certificates", "curl"]);
    assert_eq!(calls[1].image, "debian:bookworm-slim");

    assert_eq!(report.images().count(), 2);
    assert_eq!(report.packages().count(), 3);
    assert_eq!(report.skipped, vec!["git"]);
    assert_eq!(
        report.anchored[0],
        Anchored::Image {
            stage: Some("builder".to_string()),
            image: "golang:1.22-bookworm".to_string(),
            digest: "sha256:aaa".to_string(),
        }
    );
}

#[tokio::test]
async fn test_each_architecture_starts_from_the_template() {
    let anchorer = anchorer().with_pin_format(PinFormat::ArchQualified);

    let mut outputs = Vec::new();
    for architecture in ["amd64", "arm64"] {
        let mut nodes = dockerfile::parse(TEMPLATE);
        anchorer.process(&mut nodes, architecture, &CancellationToken::new()).await.unwrap();
        outputs.push(nodes.to_string());
    }

    assert!(outputs[0].contains("curl:amd64=7.88.1-10+deb12u5"));
    assert!(!outputs[0].contains("arm64"));
    assert!(outputs[1].contains("curl:arm64=7.88.1-10+deb12u5"));
    assert!(!outputs[1].contains("amd64"));
    assert_eq!(outputs[1].matches("dpkg --add-architecture arm64").count(), 2);

    let architectures: Vec<String> =
        anchorer.version_resolver().calls().into_iter().map(|c| c.architecture).collect();
    assert_eq!(architectures, vec!["amd64", "amd64", "arm64", "arm64"]);
}

#[tokio::test]
async fn test_package_failure_aborts_pass() {
    let anchorer = Anchorer::new(
        StubDigestResolver::new(&[
            ("golang:1.22-bookworm", "sha256:aaa"),
            ("debian:bookworm-slim", "sha256:bbb"),
        ]),
        StubVersionResolver::failing("E: Unable to locate package make:amd64"),
    );
    let mut nodes = dockerfile::parse(TEMPLATE);

    let err = anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap_err();

    match err.downcast_ref::<AnchorError>() {
        Some(AnchorError::PackageResolution {
            packages,
            architecture,
            image,
            reason,
        }) => {
            assert_eq!(packages, "make");
            assert_eq!(architecture, "amd64");
            assert_eq!(image, "golang:1.22-bookworm");
            assert!(reason.contains("Unable to locate package"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // The second stage was never reached.
    assert_eq!(anchorer.digest_resolver().calls(), vec!["golang:1.22-bookworm"]);
}

#[tokio::test]
async fn test_malformed_directive_is_inert() {
    let anchorer = anchorer();
    let text = "FROM debian:bookworm-slim\n# anchor ignore junk\n# anchor\nRUN apt-get install -y curl\n";
    let mut nodes = dockerfile::parse(text);

    anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap();

    assert!(nodes.to_string().contains("curl=7.88.1-10+deb12u5"));
    assert!(nodes.to_string().contains("# anchor ignore junk\n# anchor\n"));
}

#[tokio::test]
async fn test_file_without_pinnable_instructions_is_unchanged() {
    let anchorer = anchorer();
    let text = "# comment only\n\nARG X=1\nENV A=b \\\n    C=d\n  # indented\nLABEL x=y";
    let mut nodes = dockerfile::parse(text);

    let report = anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap();

    assert_eq!(nodes.to_string(), text);
    assert!(report.is_empty());
    assert!(anchorer.digest_resolver().calls().is_empty());
    assert!(anchorer.version_resolver().calls().is_empty());
}
