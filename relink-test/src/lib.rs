// Integration test utilities and multi-project fixtures for relink.

use std::path::{Path, PathBuf};

use relink_core::store::{GraphBackend, MemoryBackend, SqliteBackend};
use relink_core::types::RelType;
use relink_graphs::module_path::module_qualified_name;

pub const LIBRARY_CLASS: &str = r#"package com.example.lib;

/** Entry points of the library. */
public class LibraryClass {
    public static String greet() {
        return "hello";
    }

    public static String farewell() {
        return "bye";
    }
}
"#;

pub const LIBRARY_HELPER: &str = r"package com.example.lib;

public class LibraryHelper {
    public static void help() {
    }
}
";

pub const CONSUMER_APP: &str = r"package com.example.app;

import com.example.lib.LibraryClass;

public class App {
    public String run() {
        return LibraryClass.greet();
    }
}
";

pub const BATCH_APP: &str = r"package com.example.app;

import com.example.lib.LibraryClass;
import com.example.lib.LibraryHelper;

public class App {
    public void run() {
        LibraryClass.greet();
        LibraryClass.farewell();
        LibraryHelper.help();
        local();
    }

    void local() {
    }
}
";

pub const FQ_APP: &str = r"package com.example.app;

public class App {
    public String run() {
        return com.example.lib.LibraryClass.greet();
    }
}
";

pub const TELEMETRY_APP: &str = r"package com.microsoft.app;

import com.microsoft.telemetry.TelemetryProvider;

public class App {
    private final TelemetryProvider telemetryProvider;

    public App(TelemetryProvider telemetryProvider) {
        this.telemetryProvider = telemetryProvider;
    }

    public void run() {
        telemetryProvider.resolveCoordinate(null, 1, 2);
    }
}
";

pub const TELEMETRY_PROVIDER: &str = r"package com.microsoft.telemetry;

import com.microsoft.telemetry.dto.LocationDTO;

public interface TelemetryProvider {
    LocationDTO resolveCoordinate(
        LocationDTO locationDTO,
        int observerSiteId,
        int observerUnitId
    );
}
";

pub const LOCATION_DTO: &str = r"package com.microsoft.telemetry.dto;

public record LocationDTO(double lat, double lon) {}
";

pub const FJORD_APP: &str = r"package com.microsoft.app;

import io.fjord.telemetry.TelemetryProvider;

public class App {
    private final TelemetryProvider telemetryProvider;

    public App(TelemetryProvider telemetryProvider) {
        this.telemetryProvider = telemetryProvider;
    }

    public void run() {
        telemetryProvider.resolveCoordinate(null, 1, 2);
    }
}
";

pub const FJORD_PROVIDER: &str = r"package io.fjord.telemetry;

public interface TelemetryProvider {
    Object resolveCoordinate(Object location, int siteId, int unitId);
}
";

pub const ANALYTICS_CLIENT: &str = r#""""Event sink."""


def emit(event):
    return event


class Tracker:
    def track(self, name):
        emit(name)
"#;

pub const SHOP_CHECKOUT: &str = r#"from analytics.client import emit, Tracker
import analytics.client as ac
import requests


def checkout(order, tracker: Tracker):
    emit("checkout")
    ac.emit("done")
    tracker.track(order)
    requests.post(order)


checkout(None, None)
"#;

pub const JAVA_MAIN: &str = "src/main/java";

/// A temporary directory holding one subdirectory per project.
#[derive(Debug)]
pub struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn project(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    /// Write `contents` to `<project>/<relative>` and return the project root.
    pub fn write(&self, project: &str, relative: &str, contents: &str) -> PathBuf {
        let root = self.project(project);
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().expect("file has a parent")).unwrap();
        std::fs::write(&path, contents).unwrap();
        root
    }

    /// `library`: `com.example.lib.LibraryClass` and `LibraryHelper`.
    pub fn library(&self, name: &str) -> PathBuf {
        self.write(
            name,
            &format!("{JAVA_MAIN}/com/example/lib/LibraryHelper.java"),
            LIBRARY_HELPER,
        );
        self.write(
            name,
            &format!("{JAVA_MAIN}/com/example/lib/LibraryClass.java"),
            LIBRARY_CLASS,
        )
    }

    /// A Java project with a single `com.example.app.App`.
    pub fn java_app(&self, name: &str, source: &str) -> PathBuf {
        self.write(name, &format!("{JAVA_MAIN}/com/example/app/App.java"), source)
    }

    /// A Java project with a single `com.microsoft.app.App`.
    pub fn microsoft_app(&self, name: &str, source: &str) -> PathBuf {
        self.write(name, &format!("{JAVA_MAIN}/com/microsoft/app/App.java"), source)
    }

    pub fn telemetry_library(&self, name: &str) -> PathBuf {
        self.write(
            name,
            &format!("{JAVA_MAIN}/com/microsoft/telemetry/dto/LocationDTO.java"),
            LOCATION_DTO,
        );
        self.write(
            name,
            &format!("{JAVA_MAIN}/com/microsoft/telemetry/TelemetryProvider.java"),
            TELEMETRY_PROVIDER,
        )
    }

    pub fn fjord_library(&self, name: &str) -> PathBuf {
        self.write(
            name,
            &format!("{JAVA_MAIN}/io/fjord/telemetry/TelemetryProvider.java"),
            FJORD_PROVIDER,
        )
    }

    pub fn analytics(&self) -> PathBuf {
        self.write("analytics", "analytics/__init__.py", "");
        self.write("analytics", "analytics/client.py", ANALYTICS_CLIENT)
    }

    pub fn shop(&self) -> PathBuf {
        self.write("shop", "shop/__init__.py", "");
        self.write("shop", "shop/checkout.py", SHOP_CHECKOUT)
    }
}

/// Module qualified name of a file of `project`.
pub fn module_qn(project: &str, relative: &str) -> String {
    module_qualified_name(project, Path::new(relative))
}

/// Qualified name of `<Type>.<member>` declared in `<package>/<Type>.java`
/// under the Maven source root of `project`.
pub fn java_member(project: &str, package: &str, type_name: &str, member: &str) -> String {
    let relative = format!("{JAVA_MAIN}/{}/{type_name}.java", package.replace('.', "/"));
    format!("{}.{type_name}.{member}", module_qn(project, &relative))
}

/// A `CALLS` edge flattened for assertions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CallEdge {
    pub from: String,
    pub to: String,
    pub resolution: String,
}

pub async fn call_edges(backend: &dyn GraphBackend) -> anyhow::Result<Vec<CallEdge>> {
    let mut edges: Vec<CallEdge> = backend
        .relationships(RelType::Calls)
        .await?
        .into_iter()
        .map(|rel| CallEdge {
            from: rel.from.qualified_name,
            to: rel.to.qualified_name,
            resolution: rel
                .properties
                .get("resolution")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
        .collect();
    edges.sort();
    Ok(edges)
}

/// Edges leaving `from`.
pub async fn calls_from(backend: &dyn GraphBackend, from: &str) -> anyhow::Result<Vec<CallEdge>> {
    Ok(call_edges(backend)
        .await?
        .into_iter()
        .filter(|e| e.from == from)
        .collect())
}

/// Both backend implementations, labelled for assertion messages.
pub fn backends() -> Vec<(&'static str, Box<dyn GraphBackend>)> {
    vec![
        ("memory", Box::new(MemoryBackend::new())),
        (
            "sqlite",
            Box::new(SqliteBackend::in_memory().expect("open in-memory sqlite")),
        ),
    ]
}
