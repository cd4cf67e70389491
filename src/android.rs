//! JNI calls into the hosting activity.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use jni::{
    objects::{JObject, JObjectArray, JString, JValueGen},
    sys::{jint, jobject, JNIInvokeInterface_},
    JNIEnv, JavaVM,
};
use log::info;
use slint::android::AndroidApp;

use crate::controller::Permissions;

const PERMISSION_REQUEST_CODE: i32 = 10;

fn with_activity<R>(
    app: &AndroidApp,
    f: impl FnOnce(&mut JNIEnv, &JObject) -> Result<R>,
) -> Result<R> {
    unsafe {
        let vm = JavaVM::from_raw(app.vm_as_ptr() as *mut *const JNIInvokeInterface_)?;
        let mut env = vm.attach_current_thread()?;
        let activity = JObject::from_raw(app.activity_as_ptr() as jobject);
        f(&mut env, &activity)
    }
}

pub fn sdk_version(app: &AndroidApp) -> Result<i32> {
    with_activity(app, |env, _| {
        Ok(env
            .get_static_field("android/os/Build$VERSION", "SDK_INT", "I")?
            .i()?)
    })
}

pub fn check_self_permission(app: &AndroidApp, permission: &str) -> Result<bool> {
    with_activity(app, |env, activity| {
        let granted_int = env
            .get_static_field(
                "android/content/pm/PackageManager",
                "PERMISSION_GRANTED",
                "I",
            )?
            .i()?;
        let permission_str = env.new_string(permission)?;
        let result = env
            .call_method(
                activity,
                "checkSelfPermission",
                "(Ljava/lang/String;)I",
                &[JValueGen::Object(&JObject::from(permission_str))],
            )?
            .i()?;
        Ok(result == granted_int)
    })
}

pub fn request_permissions(app: &AndroidApp, permissions: &[&str], request_code: i32) -> Result<()> {
    with_activity(app, |env, activity| {
        let java_permission_array =
            env.new_object_array(permissions.len() as jint, "java/lang/String", JObject::null())?;
        for (index, permission) in permissions.iter().enumerate() {
            let permission_str = env.new_string(*permission)?;
            env.set_object_array_element(&java_permission_array, index as jint, permission_str)?;
        }
        env.call_method(
            activity,
            "requestPermissions",
            "([Ljava/lang/String;I)V",
            &[
                JValueGen::Object(&JObject::from(java_permission_array)),
                request_code.into(),
            ],
        )?;
        Ok(())
    })
}

fn absolute_path(env: &mut JNIEnv, file: &JObject) -> Result<PathBuf> {
    let path = env
        .call_method(file, "getAbsolutePath", "()Ljava/lang/String;", &[])?
        .l()?;
    let path: JString = path.into();
    let path: String = env.get_string(&path)?.into();
    Ok(PathBuf::from(path))
}

/// `Context.getFilesDir()`, the internal storage fallback.
pub fn files_dir(app: &AndroidApp) -> Result<PathBuf> {
    with_activity(app, |env, activity| {
        let file = env
            .call_method(activity, "getFilesDir", "()Ljava/io/File;", &[])?
            .l()?;
        if file.is_null() {
            return Err(anyhow!("getFilesDir returned null"));
        }
        absolute_path(env, &file)
    })
}

/// First entry of `Context.getExternalMediaDirs()`, if mounted.
pub fn external_media_dir(app: &AndroidApp) -> Result<Option<PathBuf>> {
    with_activity(app, |env, activity| {
        let dirs = env
            .call_method(activity, "getExternalMediaDirs", "()[Ljava/io/File;", &[])?
            .l()?;
        if dirs.is_null() {
            return Ok(None);
        }
        let dirs = JObjectArray::from(dirs);
        if env.get_array_length(&dirs)? < 1 {
            return Ok(None);
        }
        let first = env.get_object_array_element(&dirs, 0)?;
        if first.is_null() {
            return Ok(None);
        }
        absolute_path(env, &first).map(Some)
    })
}

pub fn finish_activity(app: &AndroidApp) -> Result<()> {
    with_activity(app, |env, activity| {
        env.call_method(activity, "finish", "()V", &[])?;
        Ok(())
    })
}

pub struct AndroidPermissions {
    app: AndroidApp,
}

impl AndroidPermissions {
    pub fn new(app: AndroidApp) -> Self {
        Self { app }
    }
}

impl Permissions for AndroidPermissions {
    fn is_granted(&self, permission: &str) -> bool {
        // Runtime permissions arrived with Android 6 (API 23)
        if matches!(sdk_version(&self.app), Ok(version) if version < 23) {
            return true;
        }
        check_self_permission(&self.app, permission).unwrap_or_else(|err| {
            log::error!("checkSelfPermission({permission}) failed: {err:?}");
            false
        })
    }

    fn request(&mut self, permissions: &[&str]) -> Result<()> {
        info!("sdk version:{:?}", sdk_version(&self.app));
        request_permissions(&self.app, permissions, PERMISSION_REQUEST_CODE)
    }
}
